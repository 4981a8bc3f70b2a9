use serde::{Deserialize, Serialize};

/// A stored post, as read back from the `posts` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub hash_id: String,
    pub title: String,
    pub source: String,
    pub author: String,
    pub category: String,
    pub content: String,
    pub published: i64,
    pub enclosure_url: Option<String>,
    pub enclosure_type: Option<String>,
}

/// A post ready to be committed; `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub hash_id: String,
    pub title: String,
    pub source: String,
    pub author: String,
    pub category: String,
    pub content: String,
    pub published: i64,
    pub enclosure_url: Option<String>,
    pub enclosure_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostField {
    Id,
    HashId,
    Title,
    Source,
    Author,
    Category,
    Published,
    EnclosureUrl,
    EnclosureType,
}

impl PostField {
    pub fn column(self) -> &'static str {
        match self {
            PostField::Id => "id",
            PostField::HashId => "hash_id",
            PostField::Title => "title",
            PostField::Source => "source",
            PostField::Author => "author",
            PostField::Category => "category",
            PostField::Published => "published",
            PostField::EnclosureUrl => "enclosure_url",
            PostField::EnclosureType => "enclosure_type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

/// Field equality filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFilter {
    pub field: PostField,
    pub value: FilterValue,
}

impl PostFilter {
    pub fn eq(field: PostField, value: impl Into<FilterValue>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// Read-back query. The default is every post, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub filter: Option<PostFilter>,
    pub order_by: PostField,
    pub order: SortOrder,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl Default for PostQuery {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: PostField::Published,
            order: SortOrder::Descending,
            limit: None,
            offset: 0,
        }
    }
}

impl PostQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: PostField, value: impl Into<FilterValue>) -> Self {
        self.filter = Some(PostFilter::eq(field, value));
        self
    }

    pub fn order_by(mut self, field: PostField, order: SortOrder) -> Self {
        self.order_by = field;
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}
