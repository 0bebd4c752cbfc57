//! Migration: Create the mirrors, repos and status tables
//!
//! The DDL is written per backend so the primary key clause comes from
//! `auto_increment_primary_key`.

use sea_orm_migration::prelude::*;

use crate::db::auto_increment_primary_key;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let pk = auto_increment_primary_key(manager.get_database_backend());

        db.execute_unprepared(&format!(
            "CREATE TABLE IF NOT EXISTS mirrors (
                mirror_id {pk},
                name TEXT NOT NULL UNIQUE,
                basedir TEXT NOT NULL DEFAULT '',
                basedir_altarch TEXT NOT NULL DEFAULT '',
                http BOOLEAN NOT NULL DEFAULT TRUE,
                https BOOLEAN NOT NULL DEFAULT FALSE,
                rsync BOOLEAN NOT NULL DEFAULT FALSE,
                ipv4 BOOLEAN NOT NULL DEFAULT FALSE,
                ipv6 BOOLEAN NOT NULL DEFAULT FALSE,
                continent TEXT NOT NULL DEFAULT '',
                country TEXT NOT NULL DEFAULT '',
                region TEXT NOT NULL DEFAULT '',
                latitude DOUBLE PRECISION NOT NULL DEFAULT 0,
                longitude DOUBLE PRECISION NOT NULL DEFAULT 0,
                enabled BOOLEAN NOT NULL DEFAULT TRUE
            )"
        ))
        .await?;

        db.execute_unprepared(&format!(
            "CREATE TABLE IF NOT EXISTS repos (
                repo_id {pk},
                major_release INTEGER NOT NULL,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                arch TEXT NOT NULL,
                is_altarch BOOLEAN NOT NULL DEFAULT FALSE,
                enabled BOOLEAN NOT NULL DEFAULT TRUE
            )"
        ))
        .await?;

        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS status (
                mirror_id BIGINT NOT NULL,
                repo_id BIGINT NOT NULL,
                timestamp BIGINT NOT NULL DEFAULT 0,
                checked BIGINT NOT NULL DEFAULT 0,
                result INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (mirror_id, repo_id)
            )",
        )
        .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_repos_lookup")
                    .table(Alias::new("repos"))
                    .col(Alias::new("major_release"))
                    .col(Alias::new("name"))
                    .col(Alias::new("arch"))
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_status_checked")
                    .table(Alias::new("status"))
                    .col(Alias::new("checked"))
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in ["status", "repos", "mirrors"] {
            manager
                .drop_table(Table::drop().table(Alias::new(table)).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}
