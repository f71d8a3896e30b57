//! # Album and Artist Grouping
//!
//! Albums group songs by exact album title, artists by each name in a
//! multi-artist tag. Both are derived data: a rebuild recomputes them from the
//! full song set and deletes any group whose key no longer appears.

use std::collections::{BTreeMap, BTreeSet};

use core_library::{Album, Artist, CatalogStore, CatalogWrite, DownloadState, Song, SongQuery};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupingSummary {
    pub albums: usize,
    pub artists: usize,
    pub albums_removed: usize,
    pub artists_removed: usize,
    /// Puts and deletes actually written.
    pub writes: usize,
}

/// Every song is fully downloaded. An empty album is not.
pub fn album_downloaded<'a>(songs: impl IntoIterator<Item = &'a Song>) -> bool {
    let mut any = false;
    for song in songs {
        if song.download_state != DownloadState::Downloaded {
            return false;
        }
        any = true;
    }
    any
}

pub fn compute_grouping(songs: &[Song]) -> (Vec<Album>, Vec<Artist>) {
    let mut albums: BTreeMap<&str, Vec<&Song>> = BTreeMap::new();
    let mut artists: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for song in songs {
        if let Some(title) = song.album.as_deref().filter(|t| !t.trim().is_empty()) {
            albums.entry(title).or_default().push(song);
        }
        for name in song.artist_names() {
            artists.entry(name).or_default().insert(song.id.as_str());
        }
    }

    let albums = albums
        .into_iter()
        .map(|(title, members)| {
            let mut song_ids: Vec<String> = members.iter().map(|s| s.id.clone()).collect();
            song_ids.sort();
            Album {
                title: title.to_string(),
                song_ids,
                downloaded: album_downloaded(members),
            }
        })
        .collect();

    let artists = artists
        .into_iter()
        .map(|(name, ids)| Artist {
            name: name.to_string(),
            song_ids: ids.into_iter().map(str::to_string).collect(),
        })
        .collect();

    (albums, artists)
}

/// Recompute all albums and artists and write the difference in one batch.
#[instrument(skip(store))]
pub async fn rebuild_grouping(store: &dyn CatalogStore) -> Result<GroupingSummary> {
    let songs = store.find_songs(SongQuery::All).await?;
    let (albums, artists) = compute_grouping(&songs);

    let stored_albums: BTreeMap<String, Album> = store
        .albums()
        .await?
        .into_iter()
        .map(|a| (a.title.clone(), a))
        .collect();
    let stored_artists: BTreeMap<String, Artist> = store
        .artists()
        .await?
        .into_iter()
        .map(|a| (a.name.clone(), a))
        .collect();

    let mut summary = GroupingSummary {
        albums: albums.len(),
        artists: artists.len(),
        ..Default::default()
    };
    let mut writes = Vec::new();

    let album_keys: BTreeSet<&str> = albums.iter().map(|a| a.title.as_str()).collect();
    for title in stored_albums.keys().filter(|t| !album_keys.contains(t.as_str())) {
        writes.push(CatalogWrite::DeleteAlbum(title.clone()));
        summary.albums_removed += 1;
    }
    let artist_keys: BTreeSet<&str> = artists.iter().map(|a| a.name.as_str()).collect();
    for name in stored_artists.keys().filter(|n| !artist_keys.contains(n.as_str())) {
        writes.push(CatalogWrite::DeleteArtist(name.clone()));
        summary.artists_removed += 1;
    }

    for album in albums {
        if stored_albums.get(&album.title) != Some(&album) {
            writes.push(CatalogWrite::PutAlbum(album));
        }
    }
    for artist in artists {
        if stored_artists.get(&artist.name) != Some(&artist) {
            writes.push(CatalogWrite::PutArtist(artist));
        }
    }

    summary.writes = writes.len();
    if !writes.is_empty() {
        store.transaction(writes).await?;
    }

    debug!(
        albums = summary.albums,
        artists = summary.artists,
        writes = summary.writes,
        "Grouping rebuilt"
    );
    Ok(summary)
}

/// Recompute the `downloaded` flag of one album after a download change.
pub async fn refresh_album(store: &dyn CatalogStore, title: &str) -> Result<()> {
    let Some(mut album) = store.albums().await?.into_iter().find(|a| a.title == title) else {
        return Ok(());
    };
    let songs = store.find_songs(SongQuery::ByAlbum(title.to_string())).await?;
    let downloaded = album_downloaded(&songs);
    if album.downloaded != downloaded {
        album.downloaded = downloaded;
        store.transaction(vec![CatalogWrite::PutAlbum(album)]).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::{BackendId, InMemoryCatalogStore};

    fn song(id: &str, album: Option<&str>, artist: Option<&str>) -> Song {
        let mut song = Song::new(id, BackendId::new("local"), "", "v1");
        song.album = album.map(str::to_string);
        song.artist = artist.map(str::to_string);
        song
    }

    #[test]
    fn test_groups_by_album_and_split_artists() {
        let songs = vec![
            song("s2", Some("Kind of Blue"), Some("Miles Davis; John Coltrane")),
            song("s1", Some("Kind of Blue"), Some("Miles Davis")),
            song("s3", Some("  "), Some("Bill Evans")),
            song("s4", None, None),
        ];
        let (albums, artists) = compute_grouping(&songs);

        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].title, "Kind of Blue");
        assert_eq!(albums[0].song_ids, vec!["s1", "s2"]);

        let names: Vec<&str> = artists.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Bill Evans", "John Coltrane", "Miles Davis"]);
        assert_eq!(artists[2].song_ids, vec!["s1", "s2"]);
    }

    #[test]
    fn test_album_downloaded_requires_every_song() {
        let done = song("s1", Some("A"), None).with_download_state(DownloadState::Downloaded);
        let outdated = song("s2", Some("A"), None).with_download_state(DownloadState::DownloadedOutdated);
        assert!(album_downloaded([&done]));
        assert!(!album_downloaded([&done, &outdated]));
        assert!(!album_downloaded(std::iter::empty()));
    }

    #[tokio::test]
    async fn test_rebuild_removes_stale_groups() {
        let store = InMemoryCatalogStore::new();
        store
            .insert_song(song("s1", Some("Old"), Some("Someone")))
            .await
            .unwrap();
        let first = rebuild_grouping(&store).await.unwrap();
        assert_eq!((first.albums, first.artists), (1, 1));

        store
            .transaction(vec![CatalogWrite::PutSong(song("s1", Some("New"), Some("Other")))])
            .await
            .unwrap();
        let second = rebuild_grouping(&store).await.unwrap();
        assert_eq!(second.albums_removed, 1);
        assert_eq!(second.artists_removed, 1);

        let albums = store.albums().await.unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].title, "New");

        let third = rebuild_grouping(&store).await.unwrap();
        assert_eq!(third.writes, 0);
    }

    #[tokio::test]
    async fn test_refresh_album_flag() {
        let store = InMemoryCatalogStore::new();
        store.insert_song(song("s1", Some("A"), None)).await.unwrap();
        rebuild_grouping(&store).await.unwrap();
        assert!(!store.albums().await.unwrap()[0].downloaded);

        store
            .transaction(vec![CatalogWrite::PutSong(
                song("s1", Some("A"), None).with_download_state(DownloadState::Downloaded),
            )])
            .await
            .unwrap();
        refresh_album(&store, "A").await.unwrap();
        assert!(store.albums().await.unwrap()[0].downloaded);
    }
}
