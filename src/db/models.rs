//! Database models
//!
//! Data structures representing database tables. Each record knows its
//! column list and how to read itself from a row selected with that list.

use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reader account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub is_premium: bool,
    #[serde(skip_serializing, default)]
    pub is_deleted: bool,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub const COLUMNS: &'static str = "id, username, email, password_hash, full_name, bio, avatar_url, \
         is_active, is_premium, is_deleted, last_login, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            full_name: row.get(4)?,
            bio: row.get(5)?,
            avatar_url: row.get(6)?,
            is_active: row.get(7)?,
            is_premium: row.get(8)?,
            is_deleted: row.get(9)?,
            last_login: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

/// Back-office account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub role_id: Option<String>,
    pub is_superadmin: bool,
    pub is_active: bool,
    pub last_login: Option<String>,
    pub login_count: i64,
    pub failed_login_attempts: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Admin {
    pub const COLUMNS: &'static str = "id, username, email, password_hash, full_name, role_id, \
         is_superadmin, is_active, last_login, login_count, failed_login_attempts, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            full_name: row.get(4)?,
            role_id: row.get(5)?,
            is_superadmin: row.get(6)?,
            is_active: row.get(7)?,
            last_login: row.get(8)?,
            login_count: row.get(9)?,
            failed_login_attempts: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Role {
    pub const COLUMNS: &'static str = "id, name, description, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl Permission {
    pub const COLUMNS: &'static str = "id, name, description, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

/// Login session backing an admin token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSession {
    pub id: String,
    pub admin_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub expires_at: String,
    pub ended_at: Option<String>,
}

impl AdminSession {
    pub const COLUMNS: &'static str =
        "id, admin_id, ip_address, user_agent, is_active, created_at, expires_at, ended_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            admin_id: row.get(1)?,
            ip_address: row.get(2)?,
            user_agent: row.get(3)?,
            is_active: row.get(4)?,
            created_at: row.get(5)?,
            expires_at: row.get(6)?,
            ended_at: row.get(7)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub display_order: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Category {
    pub const COLUMNS: &'static str =
        "id, name, slug, description, parent_id, display_order, is_active, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            description: row.get(3)?,
            parent_id: row.get(4)?,
            display_order: row.get(5)?,
            is_active: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_at: String,
}

impl Tag {
    pub const COLUMNS: &'static str = "id, name, slug, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub biography: Option<String>,
    pub nationality: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Author {
    pub const COLUMNS: &'static str =
        "id, name, slug, biography, nationality, photo_url, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            biography: row.get(3)?,
            nationality: row.get(4)?,
            photo_url: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publisher {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Publisher {
    pub const COLUMNS: &'static str =
        "id, name, slug, description, website, logo_url, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            description: row.get(3)?,
            website: row.get(4)?,
            logo_url: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

/// Book record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub isbn: Option<String>,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub publisher_id: Option<String>,
    pub language: String,
    pub page_count: Option<i64>,
    pub publication_date: Option<String>,
    pub cover_url: Option<String>,
    pub is_featured: bool,
    pub is_published: bool,
    pub avg_rating: f64,
    pub review_count: i64,
    pub view_count: i64,
    #[serde(skip_serializing, default)]
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Book {
    pub const COLUMNS: &'static str = "id, isbn, title, subtitle, description, publisher_id, language, \
         page_count, publication_date, cover_url, is_featured, is_published, avg_rating, review_count, \
         view_count, is_deleted, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            isbn: row.get(1)?,
            title: row.get(2)?,
            subtitle: row.get(3)?,
            description: row.get(4)?,
            publisher_id: row.get(5)?,
            language: row.get(6)?,
            page_count: row.get(7)?,
            publication_date: row.get(8)?,
            cover_url: row.get(9)?,
            is_featured: row.get(10)?,
            is_published: row.get(11)?,
            avg_rating: row.get(12)?,
            review_count: row.get(13)?,
            view_count: row.get(14)?,
            is_deleted: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }
}

/// Book together with its related catalog records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDetail {
    #[serde(flatten)]
    pub book: Book,
    pub publisher: Option<Publisher>,
    pub authors: Vec<Author>,
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
}

/// Chapter record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub book_id: String,
    pub number: i64,
    pub title: String,
    pub content: String,
    pub word_count: i64,
    pub is_free: bool,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Chapter {
    pub const COLUMNS: &'static str = "id, book_id, number, title, content, word_count, is_free, \
         is_published, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            book_id: row.get(1)?,
            number: row.get(2)?,
            title: row.get(3)?,
            content: row.get(4)?,
            word_count: row.get(5)?,
            is_free: row.get(6)?,
            is_published: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

/// Chapter listing entry without the body text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub id: String,
    pub book_id: String,
    pub number: i64,
    pub title: String,
    pub word_count: i64,
    pub is_free: bool,
    pub is_published: bool,
}

impl From<Chapter> for ChapterSummary {
    fn from(chapter: Chapter) -> Self {
        Self {
            id: chapter.id,
            book_id: chapter.book_id,
            number: chapter.number,
            title: chapter.title,
            word_count: chapter.word_count,
            is_free: chapter.is_free,
            is_published: chapter.is_published,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub currency: String,
    pub billing_cycle: String,
    pub duration_days: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl SubscriptionPlan {
    pub const COLUMNS: &'static str = "id, name, description, price, currency, billing_cycle, \
         duration_days, is_active, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            price: row.get(3)?,
            currency: row.get(4)?,
            billing_cycle: row.get(5)?,
            duration_days: row.get(6)?,
            is_active: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub status: String,
    pub start_date: String,
    pub end_date: String,
    pub auto_renew: bool,
    pub cancelled_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Subscription {
    pub const COLUMNS: &'static str = "id, user_id, plan_id, status, start_date, end_date, auto_renew, \
         cancelled_at, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan_id: row.get(2)?,
            status: row.get(3)?,
            start_date: row.get(4)?,
            end_date: row.get(5)?,
            auto_renew: row.get(6)?,
            cancelled_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub subscription_id: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub payment_method: String,
    pub status: String,
    pub transaction_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Payment {
    pub const COLUMNS: &'static str = "id, user_id, subscription_id, amount, currency, payment_method, \
         status, transaction_id, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            subscription_id: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            payment_method: row.get(5)?,
            status: row.get(6)?,
            transaction_id: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub rating: i64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_spoiler: bool,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Review {
    pub const COLUMNS: &'static str = "id, user_id, book_id, rating, title, content, is_spoiler, status, \
         created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            rating: row.get(3)?,
            title: row.get(4)?,
            content: row.get(5)?,
            is_spoiler: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discussion {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub chapter_id: Option<String>,
    pub parent_id: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub is_pinned: bool,
    pub is_spoiler: bool,
    pub is_hidden: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Discussion {
    pub const COLUMNS: &'static str = "id, user_id, book_id, chapter_id, parent_id, title, content, \
         is_pinned, is_spoiler, is_hidden, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            chapter_id: row.get(3)?,
            parent_id: row.get(4)?,
            title: row.get(5)?,
            content: row.get(6)?,
            is_pinned: row.get(7)?,
            is_spoiler: row.get(8)?,
            is_hidden: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl Notification {
    pub const COLUMNS: &'static str = "id, user_id, kind, title, message, link, is_read, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            title: row.get(3)?,
            message: row.get(4)?,
            link: row.get(5)?,
            is_read: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

/// Where a reader is in a book; one row per reader and book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingProgress {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub chapter_id: Option<String>,
    /// 0 to 100
    pub progress_percentage: f64,
    pub last_position: Option<String>,
    pub time_spent_seconds: i64,
    pub is_completed: bool,
    pub last_read_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ReadingProgress {
    pub const COLUMNS: &'static str = "id, user_id, book_id, chapter_id, progress_percentage, last_position, \
         time_spent_seconds, is_completed, last_read_at, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            chapter_id: row.get(3)?,
            progress_percentage: row.get(4)?,
            last_position: row.get(5)?,
            time_spent_seconds: row.get(6)?,
            is_completed: row.get(7)?,
            last_read_at: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub chapter_id: Option<String>,
    pub position: Option<String>,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Bookmark {
    pub const COLUMNS: &'static str = "id, user_id, book_id, chapter_id, position, note, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            chapter_id: row.get(3)?,
            position: row.get(4)?,
            note: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

/// Audit entry for a back-office action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminActivityLog {
    pub id: String,
    pub admin_id: Option<String>,
    pub activity_type: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

impl AdminActivityLog {
    pub const COLUMNS: &'static str = "id, admin_id, activity_type, resource_type, resource_id, \
         description, ip_address, user_agent, metadata, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let metadata: Option<String> = row.get(8)?;
        Ok(Self {
            id: row.get(0)?,
            admin_id: row.get(1)?,
            activity_type: row.get(2)?,
            resource_type: row.get(3)?,
            resource_id: row.get(4)?,
            description: row.get(5)?,
            ip_address: row.get(6)?,
            user_agent: row.get(7)?,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            created_at: row.get(9)?,
        })
    }
}

/// Audit entry for a login, logout or registration attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationLog {
    pub id: String,
    pub subject_kind: String,
    pub subject_id: Option<String>,
    pub username: String,
    pub event: String,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: String,
}

impl AuthenticationLog {
    pub const COLUMNS: &'static str = "id, subject_kind, subject_id, username, event, success, \
         ip_address, user_agent, failure_reason, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject_kind: row.get(1)?,
            subject_id: row.get(2)?,
            username: row.get(3)?,
            event: row.get(4)?,
            success: row.get(5)?,
            ip_address: row.get(6)?,
            user_agent: row.get(7)?,
            failure_reason: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

/// Declare a lowercase string enum stored as TEXT
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

text_enum!(
    /// Moderation state of a review; only approved reviews count toward ratings
    ReviewStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
);

text_enum!(SubscriptionStatus {
    Active => "active",
    Cancelled => "cancelled",
    Expired => "expired",
    Pending => "pending",
});

text_enum!(PaymentStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
});

text_enum!(
    /// Which kind of account an authentication log entry is about
    SubjectKind {
        User => "user",
        Admin => "admin",
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_enum_round_trip() {
        assert_eq!("refunded".parse::<PaymentStatus>().unwrap(), PaymentStatus::Refunded);
        assert_eq!(SubscriptionStatus::Cancelled.to_string(), "cancelled");
        assert!("archived".parse::<ReviewStatus>().is_err());
        assert_eq!(
            serde_json::to_value(ReviewStatus::Approved).unwrap(),
            serde_json::json!("approved")
        );
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let user = User {
            id: "u1".into(),
            username: "reader".into(),
            email: "reader@example.com".into(),
            password_hash: "secret-hash".into(),
            full_name: None,
            bio: None,
            avatar_url: None,
            is_active: true,
            is_premium: false,
            is_deleted: false,
            last_login: None,
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("is_deleted").is_none());
        assert_eq!(json["username"], "reader");
    }
}
