//! Beatmap set lookup and download.
//!
//! A missing difficulty is fetched in three polled steps: the server is asked
//! which set the difficulty belongs to, the set archive is downloaded, and the
//! archive is extracted under the data directory and handed to the library.

use std::path::PathBuf;

use cadence_net::DownloadProgress;
use cadence_proto::{Md5Hash, Packet};
use tracing::{debug, info, warn};

use crate::api::{ApiKind, ApiRequest};
use crate::archive::extract_beatmapset;
use crate::client::OnlineClient;
use crate::collab::LocalBeatmap;

/// One difficulty listed in a set info response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeatmapMetadata {
    pub diff_name: String,
    pub star_rating: f32,
    pub mode: u8,
}

/// Parsed set info response.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatmapSetMetadata {
    pub osz_filename: String,
    pub artist: String,
    pub title: String,
    pub creator: String,
    pub ranking_status: u8,
    pub avg_user_rating: f32,
    pub last_update: u64,
    pub set_id: i32,
    pub topic_id: i32,
    pub has_video: bool,
    pub has_storyboard: bool,
    pub osz_filesize: u64,
    pub osz_filesize_novideo: u64,
    pub beatmaps: Vec<BeatmapMetadata>,
}

impl Default for BeatmapSetMetadata {
    fn default() -> Self {
        Self {
            osz_filename: String::new(),
            artist: String::new(),
            title: String::new(),
            creator: String::new(),
            ranking_status: 0,
            avg_user_rating: 10.0,
            last_update: 0,
            set_id: 0,
            topic_id: 0,
            has_video: false,
            has_storyboard: false,
            osz_filesize: 0,
            osz_filesize_novideo: 0,
            beatmaps: Vec::new(),
        }
    }
}

fn num<T: std::str::FromStr + Default>(s: &str) -> T {
    s.trim().parse().unwrap_or_default()
}

fn flag(s: &str) -> bool {
    matches!(s.trim(), "1" | "true" | "True")
}

/// Parse one `name@mode` entry of the difficulty list.
fn parse_difficulty(entry: &str) -> Option<BeatmapMetadata> {
    let (raw, mode) = entry.rsplit_once('@')?;
    let mode = num(mode);

    // "Hard★3.60"; the name itself may contain a star
    if let Some((name, sr)) = raw.rsplit_once('★') {
        return Some(BeatmapMetadata {
            diff_name: name.replace('★', ""),
            star_rating: num(sr),
            mode,
        });
    }

    // "[3.60⭐] Hard {cs: 3.5 / od: 6.0 / ar: 8.0 / hp: 3.5}"
    if raw.starts_with('[')
        && let Some(star) = raw.find('⭐')
    {
        let sr = &raw[1..star];
        let after_star = &raw[star + '⭐'.len_utf8()..];
        let name = after_star.strip_prefix("] ").unwrap_or(after_star);
        let name = name.find(" {cs: ").map_or(name, |end| &name[..end]);
        return Some(BeatmapMetadata {
            diff_name: name.to_string(),
            star_rating: num(sr),
            mode,
        });
    }

    Some(BeatmapMetadata {
        diff_name: raw.to_string(),
        star_rating: 0.0,
        mode,
    })
}

/// Parse a `|`-separated set info response.
///
/// The first eight fields are required; later ones are read as far as they go.
/// Anything shorter yields the defaults (set id 0).
pub fn parse_beatmapset_metadata(response: &str) -> BeatmapSetMetadata {
    let tokens: Vec<&str> = response.split('|').collect();
    let mut meta = BeatmapSetMetadata::default();
    if tokens.len() < 8 {
        return meta;
    }

    meta.osz_filename = tokens[0].to_string();
    meta.artist = tokens[1].to_string();
    meta.title = tokens[2].to_string();
    meta.creator = tokens[3].to_string();
    meta.ranking_status = num(tokens[4]);
    meta.avg_user_rating = num(tokens[5]);
    meta.last_update = num(tokens[6]);
    meta.set_id = num(tokens[7]);

    let optional = |i: usize| tokens.get(i).copied();
    if let Some(t) = optional(8) {
        meta.topic_id = num(t);
    }
    if let Some(t) = optional(9) {
        meta.has_video = flag(t);
    }
    if let Some(t) = optional(10) {
        meta.has_storyboard = flag(t);
    }
    if let Some(t) = optional(11) {
        meta.osz_filesize = num(t);
    }
    if let Some(t) = optional(12) {
        meta.osz_filesize_novideo = num(t);
    }
    if let Some(t) = optional(13) {
        meta.beatmaps = t.split(',').filter_map(parse_difficulty).collect();
    }
    meta
}

/// Result of polling a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus<T> {
    /// Still working; progress in `0.0..1.0`.
    InProgress(f32),
    Ready(T),
    Failed,
}

impl<T> FetchStatus<T> {
    /// Progress as reported to the UI: 1 when ready, -1 on failure.
    pub fn progress(&self) -> f32 {
        match self {
            Self::InProgress(progress) => *progress,
            Self::Ready(_) => 1.0,
            Self::Failed => -1.0,
        }
    }
}

impl OnlineClient {
    /// Download and extract a beatmap set. Poll until it settles.
    pub fn download_beatmapset(&mut self, set_id: i32) -> FetchStatus<PathBuf> {
        let dir = self.config.read(|c| c.paths.beatmapset_dir(set_id));
        if dir.is_dir() {
            return FetchStatus::Ready(dir);
        }

        let mirror = self.config.read(|c| c.online.beatmap_mirror_override.clone());
        let base = if mirror.is_empty() {
            self.endpoint().web_url("/d/")
        } else {
            mirror
        };
        let url = format!("{base}{set_id}");

        match self.downloads.download(&url) {
            DownloadProgress::Pending(progress) => FetchStatus::InProgress(progress),
            DownloadProgress::Failed { status } => {
                warn!(set_id, status, "beatmap set download failed");
                FetchStatus::Failed
            }
            DownloadProgress::Finished { status, .. } if status != 200 => FetchStatus::Failed,
            DownloadProgress::Finished { body, .. } => match extract_beatmapset(&body, &dir) {
                Ok(files) => {
                    info!(set_id, files, "beatmap set extracted");
                    FetchStatus::Ready(dir)
                }
                Err(err) => {
                    warn!(set_id, error = %err, "failed to extract beatmap set");
                    FetchStatus::Failed
                }
            },
        }
    }

    /// Download the set holding the difficulty `md5`, unless it is already known.
    pub fn download_beatmap(&mut self, map_id: i32, md5: &Md5Hash) -> FetchStatus<LocalBeatmap> {
        if let Some(map) = self.collab.library.find_by_md5(md5) {
            return FetchStatus::Ready(map);
        }
        self.fetch_set_of(map_id, 0, |library| library.find_by_md5(md5))
            .map_found(map_id)
    }

    /// Like [`download_beatmap`](Self::download_beatmap), looked up by id.
    /// A nonzero `set_id` skips the set lookup.
    pub fn download_beatmap_by_id(&mut self, map_id: i32, set_id: i32) -> FetchStatus<LocalBeatmap> {
        if let Some(map) = self.collab.library.find_by_id(map_id) {
            return FetchStatus::Ready(map);
        }
        self.fetch_set_of(map_id, set_id, |library| library.find_by_id(map_id))
            .map_found(map_id)
    }

    fn fetch_set_of(
        &mut self,
        map_id: i32,
        known_set_id: i32,
        find: impl FnOnce(&dyn crate::collab::BeatmapLibrary) -> Option<LocalBeatmap>,
    ) -> FetchStatus<Option<LocalBeatmap>> {
        if known_set_id != 0 {
            self.set_ids.entry(map_id).or_insert(known_set_id);
        }

        let Some(&set_id) = self.set_ids.get(&map_id) else {
            if self.queried_map_id != map_id {
                let mut path = format!("/web/osu-search-set.php?b={map_id}");
                self.append_auth_params(&mut path);
                self.send_api_request(
                    ApiRequest::new(ApiKind::BeatmapsetInfo, path).with_extra_int(map_id),
                );
                self.queried_map_id = map_id;
            }
            return FetchStatus::InProgress(0.0);
        };
        if set_id == 0 {
            return FetchStatus::Failed;
        }

        let dir = match self.download_beatmapset(set_id) {
            FetchStatus::InProgress(progress) => return FetchStatus::InProgress(progress),
            FetchStatus::Failed => {
                self.set_ids.insert(map_id, 0);
                return FetchStatus::Failed;
            }
            FetchStatus::Ready(dir) => dir,
        };

        self.collab.library.add_set(&dir, set_id);
        debug!(set_id, "loaded beatmap set");
        let found = find(self.collab.library.as_ref());
        if found.is_none() {
            self.set_ids.insert(map_id, 0);
        }
        FetchStatus::Ready(found)
    }

    /// Record the set id from a set info response.
    pub(crate) fn process_set_info(&mut self, packet: &Packet) {
        let map_id = packet.extra_int;
        let set_id = if packet.is_empty() {
            0
        } else {
            parse_beatmapset_metadata(&String::from_utf8_lossy(packet.payload())).set_id
        };
        debug!(map_id, set_id, "beatmap set info");
        self.set_ids.insert(map_id, set_id);
    }
}

impl FetchStatus<Option<LocalBeatmap>> {
    fn map_found(self, map_id: i32) -> FetchStatus<LocalBeatmap> {
        match self {
            Self::InProgress(progress) => FetchStatus::InProgress(progress),
            Self::Failed | Self::Ready(None) => FetchStatus::Failed,
            // The .osu file may not carry its own id.
            Self::Ready(Some(mut map)) => {
                map.map_id = map_id;
                FetchStatus::Ready(map)
            }
        }
    }
}
