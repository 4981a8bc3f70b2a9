use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument};

use super::core::Database;
use super::store::PostStore;
use super::types::{FilterValue, NewPost, Post, PostField, PostFilter, PostQuery};
use crate::error::Result;
use crate::TARGET_DB;

const POST_COLUMNS: &str = "id, hash_id, title, source, author, category, content, published, enclosure_url, enclosure_type";

fn push_filter<'a>(builder: &mut QueryBuilder<'a, Sqlite>, filter: Option<&PostFilter>) {
    if let Some(filter) = filter {
        builder.push(" WHERE ");
        builder.push(filter.field.column());
        builder.push(" = ");
        match &filter.value {
            FilterValue::Text(text) => builder.push_bind(text.clone()),
            FilterValue::Integer(number) => builder.push_bind(*number),
        };
    }
}

impl Database {
    #[instrument(target = "db_query", level = "debug", skip(self, post), fields(hash_id = %post.hash_id))]
    pub async fn insert_post(&self, post: &NewPost) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO posts (
                hash_id, title, source, author, category,
                content, published, enclosure_url, enclosure_type
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&post.hash_id)
        .bind(&post.title)
        .bind(&post.source)
        .bind(&post.author)
        .bind(&post.category)
        .bind(&post.content)
        .bind(post.published)
        .bind(&post.enclosure_url)
        .bind(&post.enclosure_type)
        .execute(self.pool())
        .await?;

        let id = result.last_insert_rowid();
        debug!(target: TARGET_DB, "Inserted post {} as id {}", post.hash_id, id);
        Ok(id)
    }

    pub async fn load_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM posts", POST_COLUMNS));
        push_filter(&mut builder, query.filter.as_ref());

        builder.push(" ORDER BY ");
        builder.push(query.order_by.column());
        builder.push(" ");
        builder.push(query.order.keyword());
        // commit order breaks ties
        builder.push(", id ASC");

        match query.limit {
            Some(limit) => {
                builder.push(" LIMIT ");
                builder.push_bind(i64::from(limit));
            }
            // SQLite only accepts OFFSET after a LIMIT
            None if query.offset > 0 => {
                builder.push(" LIMIT -1");
            }
            None => {}
        }
        if query.offset > 0 {
            builder.push(" OFFSET ");
            builder.push_bind(i64::from(query.offset));
        }

        let posts = builder
            .build_query_as::<Post>()
            .fetch_all(self.pool())
            .await?;
        Ok(posts)
    }

    pub async fn count_posts(&self, filter: Option<&PostFilter>) -> Result<i64> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM posts");
        push_filter(&mut builder, filter);

        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl PostStore for Database {
    async fn ensure_schema(&self) -> Result<()> {
        self.initialize_schema().await
    }

    async fn insert(&self, post: &NewPost) -> Result<i64> {
        self.insert_post(post).await
    }

    async fn query(&self, query: &PostQuery) -> Result<Vec<Post>> {
        self.load_posts(query).await
    }

    async fn count(&self, filter: Option<&PostFilter>) -> Result<i64> {
        self.count_posts(filter).await
    }

    async fn find_by_hash_id(&self, hash_id: &str) -> Result<Option<Post>> {
        let query = PostQuery::new().filter(PostField::HashId, hash_id).limit(1);
        Ok(self.load_posts(&query).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SortOrder;
    use crate::error::Error;
    use tempfile::TempDir;

    fn new_post(hash_id: &str, category: &str, published: i64) -> NewPost {
        NewPost {
            hash_id: hash_id.to_string(),
            title: format!("Post {}", hash_id),
            source: format!("https://example.com/{}", hash_id),
            author: "Jane".to_string(),
            category: category.to_string(),
            content: "<p>body</p>".to_string(),
            published,
            enclosure_url: None,
            enclosure_type: None,
        }
    }

    async fn open_temp() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in(&dir.path().join("database")).await.unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn test_schema_is_created_with_post_columns() {
        let (dir, db) = open_temp().await;
        assert!(dir.path().join("database").join(crate::db::DATABASE_FILE).exists());

        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('posts') ORDER BY cid")
                .fetch_all(db.pool())
                .await
                .unwrap();
        assert_eq!(
            columns,
            vec![
                "id",
                "hash_id",
                "title",
                "source",
                "author",
                "category",
                "content",
                "published",
                "enclosure_url",
                "enclosure_type"
            ]
        );

        // Second call is a no-op
        db.ensure_schema().await.unwrap();
        assert_eq!(db.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_hash_id_is_a_conflict() {
        let (_dir, db) = open_temp().await;
        let first = db.insert(&new_post("a", "dev", 100)).await.unwrap();
        assert!(first > 0);

        let err = db.insert(&new_post("a", "news", 200)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "unexpected error: {:?}", err);
        assert_eq!(db.count(None).await.unwrap(), 1);

        let stored = db.find_by_hash_id("a").await.unwrap().unwrap();
        assert_eq!(stored.category, "dev");
        assert_eq!(stored.published, 100);
    }

    #[tokio::test]
    async fn test_default_query_is_newest_first() {
        let (_dir, db) = open_temp().await;
        db.insert(&new_post("a", "dev", 100)).await.unwrap();
        db.insert(&new_post("c", "dev", 300)).await.unwrap();
        db.insert(&new_post("b", "news", 200)).await.unwrap();
        db.insert(&new_post("d", "news", 200)).await.unwrap();

        let posts = db.query(&PostQuery::new()).await.unwrap();
        let order: Vec<&str> = posts.iter().map(|p| p.hash_id.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "d", "a"]);
        assert!(posts.windows(2).all(|w| w[0].published >= w[1].published));
    }

    #[tokio::test]
    async fn test_filter_limit_and_offset() {
        let (_dir, db) = open_temp().await;
        for (i, hash) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            let category = if i % 2 == 0 { "dev" } else { "news" };
            db.insert(&new_post(hash, category, 100 + i as i64)).await.unwrap();
        }

        let dev = db
            .query(&PostQuery::new().filter(PostField::Category, "dev"))
            .await
            .unwrap();
        let order: Vec<&str> = dev.iter().map(|p| p.hash_id.as_str()).collect();
        assert_eq!(order, vec!["e", "c", "a"]);

        let page = db.query(&PostQuery::new().limit(2).offset(1)).await.unwrap();
        let order: Vec<&str> = page.iter().map(|p| p.hash_id.as_str()).collect();
        assert_eq!(order, vec!["d", "c"]);

        let tail = db.query(&PostQuery::new().offset(3)).await.unwrap();
        let order: Vec<&str> = tail.iter().map(|p| p.hash_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);

        let oldest = db
            .query(
                &PostQuery::new()
                    .order_by(PostField::Published, SortOrder::Ascending)
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(oldest[0].hash_id, "a");

        let by_time = db
            .query(&PostQuery::new().filter(PostField::Published, 103i64))
            .await
            .unwrap();
        assert_eq!(by_time.len(), 1);
        assert_eq!(by_time[0].hash_id, "d");

        let filter = PostFilter::eq(PostField::Category, "news");
        assert_eq!(db.count(Some(&filter)).await.unwrap(), 2);
        assert_eq!(db.count(None).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_enclosure_fields_round_trip() {
        let (_dir, db) = open_temp().await;
        let mut post = new_post("pod", "audio", 42);
        post.enclosure_url = Some("https://cdn.example/ep1.mp3".to_string());
        post.enclosure_type = Some("audio/mpeg".to_string());
        db.insert(&post).await.unwrap();

        let stored = db.find_by_hash_id("pod").await.unwrap().unwrap();
        assert_eq!(stored.enclosure_url.as_deref(), Some("https://cdn.example/ep1.mp3"));
        assert_eq!(stored.enclosure_type.as_deref(), Some("audio/mpeg"));
        assert!(db.find_by_hash_id("missing").await.unwrap().is_none());
    }
}
