//! Entities of the destination schema.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Primary key in the destination schema.
///
/// Any value is a legitimate id, zero included; "not found" is always
/// expressed as `Option<TargetId>`.
pub type TargetId = i64;

/// Provenance marker stored on every migrated entity: `"<table>:<id>"`.
///
/// Legacy ids are only unique per table, so the table name is part of the key.
pub fn legacy_key(table: &str, id: i64) -> String {
    format!("{}:{}", table, id)
}

/// Kind of target entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Group,
    ForumCategory,
    Forum,
    Topic,
    Post,
    BlogPost,
    Comment,
    ProductCategory,
    Product,
    Price,
    Order,
    OrderItem,
}

impl EntityKind {
    pub const ALL: &'static [EntityKind] = &[
        EntityKind::User,
        EntityKind::Group,
        EntityKind::ForumCategory,
        EntityKind::Forum,
        EntityKind::Topic,
        EntityKind::Post,
        EntityKind::BlogPost,
        EntityKind::Comment,
        EntityKind::ProductCategory,
        EntityKind::Product,
        EntityKind::Price,
        EntityKind::Order,
        EntityKind::OrderItem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
            EntityKind::ForumCategory => "forum_category",
            EntityKind::Forum => "forum",
            EntityKind::Topic => "topic",
            EntityKind::Post => "post",
            EntityKind::BlogPost => "blog_post",
            EntityKind::Comment => "comment",
            EntityKind::ProductCategory => "product_category",
            EntityKind::Product => "product",
            EntityKind::Price => "price",
            EntityKind::Order => "order",
            EntityKind::OrderItem => "order_item",
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown entity kind '{}'", s))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub legacy_key: Option<String>,
    /// Lower-cased; unique.
    pub email: String,
    pub username: String,
    pub display_name: String,
    /// Profile URL segment; unique.
    pub handle: String,
    pub avatar: Option<String>,
    pub primary_group_id: Option<TargetId>,
    pub registered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub legacy_key: Option<String>,
    pub owner_id: TargetId,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub is_private: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumCategory {
    pub legacy_key: Option<String>,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub position: i64,
    pub group_id: Option<TargetId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forum {
    pub legacy_key: Option<String>,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub position: i64,
    pub category_id: Option<TargetId>,
    /// Parent forum for sub-forums.
    pub parent_id: Option<TargetId>,
    pub group_id: Option<TargetId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub legacy_key: Option<String>,
    pub forum_id: TargetId,
    pub user_id: TargetId,
    pub title: String,
    pub slug: String,
    pub is_sticky: bool,
    pub is_locked: bool,
    pub view_count: i64,
    pub post_count: i64,
    pub last_post_id: Option<TargetId>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub legacy_key: Option<String>,
    pub topic_id: TargetId,
    pub user_id: TargetId,
    pub body: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub legacy_key: Option<String>,
    pub author_id: TargetId,
    pub title: String,
    /// Unique; doubles as the natural key.
    pub slug: String,
    pub body: String,
    pub cover_image: Option<String>,
    pub comment_count: i64,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub legacy_key: Option<String>,
    pub blog_post_id: TargetId,
    /// `None` for guest comments.
    pub user_id: Option<TargetId>,
    pub guest_name: Option<String>,
    pub body: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub legacy_key: Option<String>,
    pub title: String,
    pub slug: String,
    pub parent_id: Option<TargetId>,
    pub position: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    OneTime,
    Subscription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub legacy_key: Option<String>,
    pub kind: ProductKind,
    /// Unique when present.
    pub sku: Option<String>,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub category_id: Option<TargetId>,
    pub image: Option<String>,
    /// Group membership granted by a subscription.
    pub grants_group_id: Option<TargetId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }
}

impl FromStr for IntervalUnit {
    type Err = String;

    /// Accepts the legacy spellings (`monthly`, `months`, `m`...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "days" | "daily" | "d" => Ok(IntervalUnit::Day),
            "week" | "weeks" | "weekly" | "w" => Ok(IntervalUnit::Week),
            "month" | "months" | "monthly" | "m" => Ok(IntervalUnit::Month),
            "year" | "years" | "yearly" | "annual" | "annually" | "y" => Ok(IntervalUnit::Year),
            other => Err(format!("unknown interval unit '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingInterval {
    pub unit: IntervalUnit,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub product_id: TargetId,
    /// ISO 4217, upper case.
    pub currency: String,
    pub amount_cents: i64,
    pub interval: Option<BillingInterval>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Map the legacy order state; anything unrecognised is pending.
    pub fn from_legacy(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "complete" | "completed" | "paid" | "active" => OrderStatus::Paid,
            "cancelled" | "canceled" | "failed" => OrderStatus::Cancelled,
            "refunded" => OrderStatus::Refunded,
            _ => OrderStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub legacy_key: Option<String>,
    pub user_id: TargetId,
    pub status: OrderStatus,
    pub currency: String,
    pub total_cents: i64,
    pub placed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub legacy_key: Option<String>,
    pub order_id: TargetId,
    pub product_id: TargetId,
    pub title: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// Any target entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum TargetEntity {
    User(User),
    Group(Group),
    ForumCategory(ForumCategory),
    Forum(Forum),
    Topic(Topic),
    Post(Post),
    BlogPost(BlogPost),
    Comment(Comment),
    ProductCategory(ProductCategory),
    Product(Product),
    Price(Price),
    Order(Order),
    OrderItem(OrderItem),
}

impl TargetEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            TargetEntity::User(_) => EntityKind::User,
            TargetEntity::Group(_) => EntityKind::Group,
            TargetEntity::ForumCategory(_) => EntityKind::ForumCategory,
            TargetEntity::Forum(_) => EntityKind::Forum,
            TargetEntity::Topic(_) => EntityKind::Topic,
            TargetEntity::Post(_) => EntityKind::Post,
            TargetEntity::BlogPost(_) => EntityKind::BlogPost,
            TargetEntity::Comment(_) => EntityKind::Comment,
            TargetEntity::ProductCategory(_) => EntityKind::ProductCategory,
            TargetEntity::Product(_) => EntityKind::Product,
            TargetEntity::Price(_) => EntityKind::Price,
            TargetEntity::Order(_) => EntityKind::Order,
            TargetEntity::OrderItem(_) => EntityKind::OrderItem,
        }
    }

    /// Unique business key, for kinds that have one.
    pub fn natural_key(&self) -> Option<&str> {
        match self {
            TargetEntity::User(u) => Some(&u.email),
            TargetEntity::BlogPost(b) => Some(&b.slug),
            TargetEntity::Product(p) => p.sku.as_deref(),
            _ => None,
        }
    }

    /// Unique URL slug, for kinds that have one.
    pub fn slug(&self) -> Option<&str> {
        match self {
            TargetEntity::User(u) => Some(&u.handle),
            TargetEntity::Group(g) => Some(&g.slug),
            TargetEntity::ForumCategory(c) => Some(&c.slug),
            TargetEntity::Forum(f) => Some(&f.slug),
            TargetEntity::Topic(t) => Some(&t.slug),
            TargetEntity::BlogPost(b) => Some(&b.slug),
            TargetEntity::ProductCategory(c) => Some(&c.slug),
            TargetEntity::Product(p) => Some(&p.slug),
            _ => None,
        }
    }

    pub fn legacy_key(&self) -> Option<&str> {
        match self {
            TargetEntity::User(e) => e.legacy_key.as_deref(),
            TargetEntity::Group(e) => e.legacy_key.as_deref(),
            TargetEntity::ForumCategory(e) => e.legacy_key.as_deref(),
            TargetEntity::Forum(e) => e.legacy_key.as_deref(),
            TargetEntity::Topic(e) => e.legacy_key.as_deref(),
            TargetEntity::Post(e) => e.legacy_key.as_deref(),
            TargetEntity::BlogPost(e) => e.legacy_key.as_deref(),
            TargetEntity::Comment(e) => e.legacy_key.as_deref(),
            TargetEntity::ProductCategory(e) => e.legacy_key.as_deref(),
            TargetEntity::Product(e) => e.legacy_key.as_deref(),
            TargetEntity::Price(_) => None,
            TargetEntity::Order(e) => e.legacy_key.as_deref(),
            TargetEntity::OrderItem(e) => e.legacy_key.as_deref(),
        }
    }

    /// Point a dependent entity at its parent. Prices belong to products and
    /// line items to orders; other kinds are left unchanged.
    pub fn attach_to(&mut self, parent: TargetId) {
        match self {
            TargetEntity::Price(p) => p.product_id = parent,
            TargetEntity::OrderItem(i) => i.order_id = parent,
            _ => {}
        }
    }

    /// Short human-readable description used in detail records.
    pub fn summary(&self) -> String {
        match self {
            TargetEntity::User(u) => format!("user {} <{}>", u.username, u.email),
            TargetEntity::Group(g) => format!("group '{}'", g.title),
            TargetEntity::ForumCategory(c) => format!("forum category '{}'", c.title),
            TargetEntity::Forum(f) => format!("forum '{}'", f.title),
            TargetEntity::Topic(t) => format!("topic '{}'", t.title),
            TargetEntity::Post(p) => format!("post in topic {}", p.topic_id),
            TargetEntity::BlogPost(b) => format!("blog post '{}'", b.slug),
            TargetEntity::Comment(c) => format!("comment on blog post {}", c.blog_post_id),
            TargetEntity::ProductCategory(c) => format!("product category '{}'", c.title),
            TargetEntity::Product(p) => format!("product '{}'", p.title),
            TargetEntity::Price(p) => format!("price {} {}", p.amount_cents, p.currency),
            TargetEntity::Order(o) => format!("order of {} {}", o.total_cents, o.currency),
            TargetEntity::OrderItem(i) => format!("{} x {}", i.quantity, i.title),
        }
    }
}

macro_rules! entity_accessors {
    ($($variant:ident => $as_fn:ident),* $(,)?) => {
        impl TargetEntity {
            $(
                pub fn $as_fn(self) -> Option<$variant> {
                    match self {
                        TargetEntity::$variant(e) => Some(e),
                        _ => None,
                    }
                }
            )*
        }

        $(
            impl From<$variant> for TargetEntity {
                fn from(e: $variant) -> Self {
                    TargetEntity::$variant(e)
                }
            }
        )*
    };
}

entity_accessors! {
    User => into_user,
    Group => into_group,
    ForumCategory => into_forum_category,
    Forum => into_forum,
    Topic => into_topic,
    Post => into_post,
    BlogPost => into_blog_post,
    Comment => into_comment,
    ProductCategory => into_product_category,
    Product => into_product,
    Price => into_price,
    Order => into_order,
    OrderItem => into_order_item,
}
