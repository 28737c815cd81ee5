// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        // Child image rows are deleted with their article
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_sources_sql = r#"
            CREATE TABLE IF NOT EXISTS news_sources (
                id TEXT PRIMARY KEY,
                source_key TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                base_url TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_categories_sql = r#"
            CREATE TABLE IF NOT EXISTS scraper_categories (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 100,
                is_enabled BOOLEAN NOT NULL DEFAULT 1,
                last_run_at DATETIME,
                metadata TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (source_id, slug),
                FOREIGN KEY (source_id) REFERENCES news_sources (id) ON DELETE CASCADE
            )
        "#;

        let create_newslist_sql = r#"
            CREATE TABLE IF NOT EXISTS newslist (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                source_article_id TEXT NOT NULL,
                url TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_processed_at DATETIME,
                error_log TEXT,
                resolved_article_id TEXT,
                meta TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (source_id, source_article_id),
                FOREIGN KEY (source_id) REFERENCES news_sources (id) ON DELETE CASCADE
            )
        "#;

        let create_articles_sql = r#"
            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                source_article_id TEXT NOT NULL,
                source_url TEXT NOT NULL,
                title TEXT NOT NULL,
                author TEXT,
                category TEXT,
                sub_category TEXT,
                tags TEXT,
                published_date TEXT,
                updated_date TEXT,
                content TEXT NOT NULL,
                excerpt TEXT,
                main_image_url TEXT,
                main_image_caption TEXT,
                scrape_status TEXT NOT NULL DEFAULT 'success',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (source_id, source_article_id),
                FOREIGN KEY (source_id) REFERENCES news_sources (id) ON DELETE CASCADE
            )
        "#;

        let create_article_images_sql = r#"
            CREATE TABLE IF NOT EXISTS article_images (
                id TEXT PRIMARY KEY,
                article_id TEXT NOT NULL,
                image_url TEXT NOT NULL,
                caption TEXT,
                display_order INTEGER NOT NULL DEFAULT 0,
                is_main_image BOOLEAN NOT NULL DEFAULT 0,
                FOREIGN KEY (article_id) REFERENCES articles (id) ON DELETE CASCADE
            )
        "#;

        let create_exception_logs_sql = r#"
            CREATE TABLE IF NOT EXISTS exception_logs (
                id TEXT PRIMARY KEY,
                error_type TEXT NOT NULL,
                error_message TEXT NOT NULL,
                error_stack TEXT,
                operation TEXT,
                source_key TEXT,
                article_id TEXT,
                article_url TEXT,
                severity TEXT NOT NULL DEFAULT 'error',
                metadata TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_newslist_status ON newslist (status);
            CREATE INDEX IF NOT EXISTS idx_newslist_created_at ON newslist (created_at);
            CREATE INDEX IF NOT EXISTS idx_categories_enabled ON scraper_categories (is_enabled);
            CREATE INDEX IF NOT EXISTS idx_articles_published ON articles (published_date);
            CREATE INDEX IF NOT EXISTS idx_article_images_article ON article_images (article_id);
        "#;

        sqlx::query(create_sources_sql).execute(&self.pool).await?;
        sqlx::query(create_categories_sql).execute(&self.pool).await?;
        sqlx::query(create_newslist_sql).execute(&self.pool).await?;
        sqlx::query(create_articles_sql).execute(&self.pool).await?;
        sqlx::query(create_article_images_sql).execute(&self.pool).await?;
        sqlx::query(create_exception_logs_sql).execute(&self.pool).await?;
        for statement in create_indexes_sql.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement).execute(&self.pool).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;
        assert!(!db.pool().is_closed());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migration.db");
        let database_url = format!("sqlite:{}", db_path.display());

        let db = DatabaseConnection::new(&database_url).await?;
        db.migrate().await?;

        for table in ["news_sources", "scraper_categories", "newslist", "articles", "article_images", "exception_logs"] {
            let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
                .bind(table)
                .fetch_optional(db.pool())
                .await?;
            assert!(result.is_some(), "missing table {table}");
        }
        Ok(())
    }
}
