//! SQLite-backed [`CatalogStore`].

use async_trait::async_trait;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{debug, instrument};

use crate::error::{LibraryError, Result};
use crate::models::{Album, Artist, Container, DownloadState, Song};
use crate::store::{CatalogStore, CatalogWrite, ContainerQuery, SongQuery};

const SONG_COLUMNS: &str = "id, backend_id, source_url, title, artist, album, genre, \
     composer, grouping, performer, duration_ms, year, track_number, disc_number, artwork, \
     local, download_state, download_progress, local_path, version_id, parent_container_id";

const CONTAINER_COLUMNS: &str = "id, backend_id, name, version_id, parent_id";

/// Upper bound on ancestor walks; deeper chains are reported as cycles.
const MAX_CONTAINER_DEPTH: i64 = 4096;

pub struct SqliteCatalogStore {
    pool: Pool<Sqlite>,
}

impl SqliteCatalogStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn song_filter(query: &SongQuery) -> (&'static str, Option<String>) {
        match query {
            SongQuery::All => ("", None),
            SongQuery::ById(id) => ("WHERE id = ?", Some(id.clone())),
            SongQuery::ByBackend(backend) => ("WHERE backend_id = ?", Some(backend.0.clone())),
            SongQuery::ByContainer(container) => {
                ("WHERE parent_container_id = ?", Some(container.clone()))
            }
            SongQuery::ByAlbum(title) => ("WHERE album = ?", Some(title.clone())),
        }
    }

    fn container_filter(query: &ContainerQuery) -> (&'static str, Option<String>) {
        match query {
            ContainerQuery::All => ("", None),
            ContainerQuery::ById(id) => ("WHERE id = ?", Some(id.clone())),
            ContainerQuery::ByBackend(backend) => {
                ("WHERE backend_id = ?", Some(backend.0.clone()))
            }
            ContainerQuery::Children(parent) => ("WHERE parent_id = ?", Some(parent.clone())),
        }
    }

    async fn apply(conn: &mut SqliteConnection, write: CatalogWrite) -> Result<()> {
        match write {
            CatalogWrite::PutSong(song) => {
                song.validate().map_err(|message| LibraryError::InvalidInput {
                    field: "song".to_string(),
                    message,
                })?;
                Self::put_song(conn, &song).await?;
            }
            CatalogWrite::DeleteSong(id) => {
                sqlx::query("DELETE FROM songs WHERE id = ?")
                    .bind(id)
                    .execute(&mut *conn)
                    .await?;
            }
            CatalogWrite::PutContainer(container) => {
                container
                    .validate()
                    .map_err(|message| LibraryError::InvalidInput {
                        field: "container".to_string(),
                        message,
                    })?;
                sqlx::query(
                    r#"
                    INSERT INTO containers (id, backend_id, name, version_id, parent_id)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        backend_id = excluded.backend_id,
                        name = excluded.name,
                        version_id = excluded.version_id,
                        parent_id = excluded.parent_id
                    "#,
                )
                .bind(&container.id)
                .bind(&container.backend_id)
                .bind(&container.name)
                .bind(&container.version_id)
                .bind(&container.parent_id)
                .execute(&mut *conn)
                .await?;
                Self::check_acyclic(conn, &container.id).await?;
            }
            CatalogWrite::DeleteContainer(id) => {
                sqlx::query("DELETE FROM containers WHERE id = ?")
                    .bind(id)
                    .execute(&mut *conn)
                    .await?;
            }
            CatalogWrite::PutAlbum(album) => {
                sqlx::query(
                    "INSERT OR REPLACE INTO albums (title, song_ids, downloaded) VALUES (?, ?, ?)",
                )
                .bind(&album.title)
                .bind(serde_json::to_string(&album.song_ids)?)
                .bind(album.downloaded)
                .execute(&mut *conn)
                .await?;
            }
            CatalogWrite::DeleteAlbum(title) => {
                sqlx::query("DELETE FROM albums WHERE title = ?")
                    .bind(title)
                    .execute(&mut *conn)
                    .await?;
            }
            CatalogWrite::PutArtist(artist) => {
                sqlx::query("INSERT OR REPLACE INTO artists (name, song_ids) VALUES (?, ?)")
                    .bind(&artist.name)
                    .bind(serde_json::to_string(&artist.song_ids)?)
                    .execute(&mut *conn)
                    .await?;
            }
            CatalogWrite::DeleteArtist(name) => {
                sqlx::query("DELETE FROM artists WHERE name = ?")
                    .bind(name)
                    .execute(&mut *conn)
                    .await?;
            }
            CatalogWrite::SetDownloadProgress { song_id, progress } => {
                sqlx::query(
                    "UPDATE songs SET download_progress = ? WHERE id = ? AND download_state = ?",
                )
                .bind(progress.clamp(0.0, 1.0))
                .bind(song_id)
                .bind(DownloadState::Downloading)
                .execute(&mut *conn)
                .await?;
            }
        }
        Ok(())
    }

    async fn put_song(conn: &mut SqliteConnection, song: &Song) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO songs (
                id, backend_id, source_url, title, artist, album, genre, composer, grouping,
                performer, duration_ms, year, track_number, disc_number, artwork, local,
                download_state, download_progress, local_path, version_id, parent_container_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                backend_id = excluded.backend_id,
                source_url = excluded.source_url,
                title = excluded.title,
                artist = excluded.artist,
                album = excluded.album,
                genre = excluded.genre,
                composer = excluded.composer,
                grouping = excluded.grouping,
                performer = excluded.performer,
                duration_ms = excluded.duration_ms,
                year = excluded.year,
                track_number = excluded.track_number,
                disc_number = excluded.disc_number,
                artwork = excluded.artwork,
                local = excluded.local,
                download_state = excluded.download_state,
                download_progress = excluded.download_progress,
                local_path = excluded.local_path,
                version_id = excluded.version_id,
                parent_container_id = excluded.parent_container_id
            "#,
        )
        .bind(&song.id)
        .bind(&song.backend_id)
        .bind(&song.source_url)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.album)
        .bind(&song.genre)
        .bind(&song.composer)
        .bind(&song.grouping)
        .bind(&song.performer)
        .bind(song.duration_ms)
        .bind(song.year)
        .bind(song.track_number)
        .bind(song.disc_number)
        .bind(&song.artwork)
        .bind(song.local)
        .bind(song.download_state)
        .bind(song.download_progress)
        .bind(&song.local_path)
        .bind(&song.version_id)
        .bind(&song.parent_container_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn check_acyclic(conn: &mut SqliteConnection, id: &str) -> Result<()> {
        let (revisits,): (i64,) = sqlx::query_as(
            r#"
            WITH RECURSIVE ancestors(id, depth) AS (
                SELECT parent_id, 1 FROM containers WHERE id = ?1
                UNION ALL
                SELECT c.parent_id, a.depth + 1
                FROM containers c JOIN ancestors a ON c.id = a.id
                WHERE a.depth < ?2
            )
            SELECT COUNT(*) FROM ancestors WHERE id = ?1 OR depth >= ?2
            "#,
        )
        .bind(id)
        .bind(MAX_CONTAINER_DEPTH)
        .fetch_one(&mut *conn)
        .await?;

        if revisits > 0 {
            return Err(LibraryError::ConstraintViolation {
                entity: "container",
                id: id.to_string(),
                message: "parent chain forms a cycle".to_string(),
            });
        }
        Ok(())
    }

    /// Foreign keys are deferred; report dangling links before committing.
    async fn check_references(conn: &mut SqliteConnection) -> Result<()> {
        let violations: Vec<(String, Option<i64>, String, i64)> =
            sqlx::query_as("PRAGMA foreign_key_check")
                .fetch_all(&mut *conn)
                .await?;

        if let Some((table, rowid, parent, _)) = violations.into_iter().next() {
            let entity = if table == "songs" { "song" } else { "container" };
            return Err(LibraryError::ConstraintViolation {
                entity,
                id: rowid.map(|r| r.to_string()).unwrap_or_default(),
                message: format!("dangling reference from {} to {}", table, parent),
            });
        }
        Ok(())
    }

    fn decode_ids(raw: &str) -> Result<Vec<String>> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn find_songs(&self, query: SongQuery) -> Result<Vec<Song>> {
        let (clause, param) = Self::song_filter(&query);
        let sql = format!("SELECT {} FROM songs {} ORDER BY id", SONG_COLUMNS, clause);
        let mut statement = sqlx::query_as::<_, Song>(&sql);
        if let Some(param) = param {
            statement = statement.bind(param);
        }
        Ok(statement.fetch_all(&self.pool).await?)
    }

    async fn find_containers(&self, query: ContainerQuery) -> Result<Vec<Container>> {
        let (clause, param) = Self::container_filter(&query);
        let sql = format!(
            "SELECT {} FROM containers {} ORDER BY id",
            CONTAINER_COLUMNS, clause
        );
        let mut statement = sqlx::query_as::<_, Container>(&sql);
        if let Some(param) = param {
            statement = statement.bind(param);
        }
        Ok(statement.fetch_all(&self.pool).await?)
    }

    async fn albums(&self) -> Result<Vec<Album>> {
        let rows: Vec<(String, String, bool)> =
            sqlx::query_as("SELECT title, song_ids, downloaded FROM albums ORDER BY title")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(title, song_ids, downloaded)| {
                Ok(Album {
                    title,
                    song_ids: Self::decode_ids(&song_ids)?,
                    downloaded,
                })
            })
            .collect()
    }

    async fn artists(&self) -> Result<Vec<Artist>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT name, song_ids FROM artists ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(name, song_ids)| {
                Ok(Artist {
                    name,
                    song_ids: Self::decode_ids(&song_ids)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, writes), fields(writes = writes.len()))]
    async fn transaction(&self, writes: Vec<CatalogWrite>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for write in writes {
            Self::apply(&mut tx, write).await?;
        }
        Self::check_references(&mut tx).await?;

        tx.commit().await?;
        debug!("Committed catalog batch");
        Ok(())
    }
}
