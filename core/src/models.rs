/*
    setlist-catalog | Authenticated catalog search for building DJ setlists.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Genre used when the catalog record carries none.
pub const UNKNOWN_GENRE: &str = "Unknown";

/// A catalog entry that can go into a setlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub bpm: f64,
    pub genre: String,
    pub artwork_url: Option<String>,
    pub duration: u64, // As reported by the catalog (milliseconds for SoundCloud)
    pub url: Option<Url>,
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} - {} ({}) @ {:.0} BPM",
            self.id, self.artist, self.title, self.genre, self.bpm
        )?;
        if let Some(url) = &self.url {
            write!(f, " | {}", url)?;
        }
        Ok(())
    }
}

/// Result of a search as written by the CLI `--json` report.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SearchReport {
    pub genre: String,
    pub bpm_from: Option<u32>,
    pub bpm_to: Option<u32>,
    pub tracks: Vec<Track>,
}

/// Track record as returned by the search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteTrack {
    pub id: u64,
    pub title: String,
    pub user: RemoteUser,
    pub genre: Option<String>,
    pub bpm: Option<f64>,
    pub duration: u64,
    pub artwork_url: Option<String>,
    pub permalink_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteUser {
    pub username: String,
}

impl RemoteTrack {
    /// Records without a tempo are useless for BPM matching and yield `None`.
    pub fn into_track(self) -> Option<Track> {
        let bpm = self.bpm?;

        Some(Track {
            id: self.id.to_string(),
            title: self.title,
            artist: self.user.username,
            bpm,
            genre: self.genre.unwrap_or_else(|| UNKNOWN_GENRE.to_string()),
            artwork_url: self.artwork_url,
            duration: self.duration,
            url: Url::parse(&self.permalink_url).ok(),
        })
    }
}

/// Successful token endpoint payload.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    #[allow(dead_code)]
    pub scope: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub token_type: Option<String>,
}

/// Error payload of the token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorResponse {
    #[serde(default)]
    #[allow(dead_code)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    pub error_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(bpm: Option<f64>, genre: Option<&str>, permalink: &str) -> RemoteTrack {
        RemoteTrack {
            id: 123,
            title: "X".to_string(),
            user: RemoteUser {
                username: "Y".to_string(),
            },
            genre: genre.map(str::to_string),
            bpm,
            duration: 200000,
            artwork_url: None,
            permalink_url: permalink.to_string(),
        }
    }

    #[test]
    fn test_remote_track_maps_to_track() {
        let track = remote(Some(128.0), Some("Techno"), "https://soundcloud.com/y/x")
            .into_track()
            .unwrap();

        assert_eq!(
            track,
            Track {
                id: "123".to_string(),
                title: "X".to_string(),
                artist: "Y".to_string(),
                bpm: 128.0,
                genre: "Techno".to_string(),
                artwork_url: None,
                duration: 200000,
                url: Some(Url::parse("https://soundcloud.com/y/x").unwrap()),
            }
        );
    }

    #[test]
    fn test_remote_track_without_bpm_is_dropped() {
        assert!(remote(None, Some("House"), "https://soundcloud.com/y/x")
            .into_track()
            .is_none());
    }

    #[test]
    fn test_missing_genre_and_bad_permalink() {
        let track = remote(Some(90.5), None, "not a url").into_track().unwrap();
        assert_eq!(track.genre, UNKNOWN_GENRE);
        assert!(track.url.is_none());
    }

    #[test]
    fn test_remote_track_decodes_from_json() {
        let json = r#"{
            "id": 123, "title": "X", "user": {"username": "Y", "id": 9},
            "genre": "Techno", "bpm": 128.0, "duration": 200000,
            "artwork_url": null, "permalink_url": "https://soundcloud.com/y/x",
            "playback_count": 42
        }"#;
        let record: RemoteTrack = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 123);
        assert_eq!(record.user.username, "Y");
        assert_eq!(record.bpm, Some(128.0));
    }

    #[test]
    fn test_track_display() {
        let track = remote(Some(174.0), Some("Drum & Bass"), "https://soundcloud.com/y/x")
            .into_track()
            .unwrap();

        let display = format!("{}", track);
        assert!(display.contains("Y - X"));
        assert!(display.contains("174 BPM"));
        assert!(display.contains("Drum & Bass"));
        assert!(display.contains("https://soundcloud.com/y/x"));
    }

    #[test]
    fn test_token_error_response_without_error_code() {
        let body = r#"{"code": 401, "message": "Unauthorized"}"#;
        let parsed: TokenErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.message, "Unauthorized");
        assert!(parsed.error_code.is_none());
    }
}
