// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Media uploads and the processing-state machine.
//!
//! The v2 upload flow is INIT → APPEND* → FINALIZE → STATUS*. Images are
//! usable immediately after FINALIZE; videos get a `processing_info` whose
//! `progress_percent` climbs monotonically on each STATUS poll until it
//! reaches 100 and the state flips from `in_progress` to `succeeded`.

use serde_json::{json, Map, Value};

use crate::error::{Error, ResourceError, Result};

use super::Store;

/// How much one STATUS poll advances a processing video.
const PROGRESS_STEP: u32 = 25;

/// Media-key category prefixes, as production assigns them.
fn category_prefix(media_type: &str) -> &'static str {
    match media_type {
        "video/mp4" => "7",
        "image/gif" => "16",
        _ => "3",
    }
}

/// The processing half of a media object.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaProcessing {
    /// `pending`, `in_progress`, `succeeded`, or `failed`.
    pub state: String,
    pub progress_percent: u32,
}

impl MediaProcessing {
    fn wire(&self) -> Value {
        let mut map = Map::new();
        map.insert("state".into(), json!(self.state));
        map.insert("progress_percent".into(), json!(self.progress_percent));
        if self.state == "pending" || self.state == "in_progress" {
            map.insert("check_after_secs".into(), json!(1));
        }
        Value::Object(map)
    }
}

/// One uploaded media object.
#[derive(Clone, Debug)]
pub struct Media {
    /// `^\d+_\d+$`; the prefix encodes the media category.
    pub media_key: String,
    /// The numeric upload id clients reference between upload commands.
    pub id: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub expires_after_secs: u64,
    pub processing: Option<MediaProcessing>,
}

impl Media {
    pub fn wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("media_key".into(), json!(self.media_key));
        map.insert("id".into(), json!(self.id));
        map.insert("type".into(), json!(wire_type(&self.media_type)));
        map.insert("size".into(), json!(self.size_bytes));
        map.insert("expires_after_secs".into(), json!(self.expires_after_secs));
        if let Some(processing) = &self.processing {
            map.insert("processing_info".into(), processing.wire());
        }
        map
    }

    /// Whether the media can be attached to a tweet yet.
    pub fn ready(&self) -> bool {
        self.processing
            .as_ref()
            .map_or(true, |p| p.state == "succeeded")
    }
}

fn wire_type(media_type: &str) -> &'static str {
    match media_type {
        "video/mp4" => "video",
        "image/gif" => "animated_gif",
        _ => "photo",
    }
}

impl Store {
    /// INIT: registers an upload and assigns a media key.
    pub fn create_media(&self, media_type: &str, total_bytes: u64) -> Media {
        let id = self.next_id();
        let media = Media {
            media_key: format!("{}_{}", category_prefix(media_type), id),
            id,
            media_type: media_type.to_string(),
            size_bytes: total_bytes,
            expires_after_secs: 86_400,
            processing: None,
        };
        self.write()
            .media
            .insert(media.media_key.clone(), media.clone());
        media
    }

    pub fn get_media_by_key(&self, media_key: &str) -> Option<Media> {
        self.read().media.get(media_key).cloned()
    }

    pub fn get_media(&self, id: &str) -> Option<Media> {
        self.read()
            .media
            .values()
            .find(|m| m.id == id)
            .cloned()
    }

    /// APPEND: accumulates chunk sizes onto the upload.
    pub fn append_media(&self, id: &str, chunk_bytes: u64) -> Result<()> {
        let mut inner = self.write();
        let media = inner
            .media
            .values_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("media", id, "media_id")))?;
        media.size_bytes += chunk_bytes;
        Ok(())
    }

    /// FINALIZE: videos enter the processing state machine, everything
    /// else becomes usable immediately.
    pub fn finalize_media(&self, id: &str) -> Result<Media> {
        let mut inner = self.write();
        let media = inner
            .media
            .values_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("media", id, "media_id")))?;
        if media.media_type == "video/mp4" && media.processing.is_none() {
            media.processing = Some(MediaProcessing {
                state: "pending".to_string(),
                progress_percent: 0,
            });
        }
        Ok(media.clone())
    }

    /// STATUS: advances processing monotonically toward 100, then flips to
    /// `succeeded`.
    pub fn media_status(&self, id: &str) -> Result<Media> {
        let mut inner = self.write();
        let media = inner
            .media
            .values_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(ResourceError::new("media", id, "media_id")))?;
        if let Some(processing) = &mut media.processing {
            if processing.state != "succeeded" && processing.state != "failed" {
                processing.progress_percent =
                    (processing.progress_percent + PROGRESS_STEP).min(100);
                processing.state = if processing.progress_percent >= 100 {
                    "succeeded".to_string()
                } else {
                    "in_progress".to_string()
                };
            }
        }
        Ok(media.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MEDIA_KEY_RE;

    #[test]
    fn media_keys_match_the_production_shape() {
        let store = Store::new();
        let photo = store.create_media("image/png", 1024);
        assert!(MEDIA_KEY_RE.is_match(&photo.media_key));
        assert!(photo.media_key.starts_with("3_"));
        assert!(photo.ready());

        let gif = store.create_media("image/gif", 1024);
        assert!(gif.media_key.starts_with("16_"));
        let video = store.create_media("video/mp4", 1024);
        assert!(video.media_key.starts_with("7_"));
    }

    #[test]
    fn video_progress_is_monotone_then_succeeds() {
        let store = Store::new();
        let video = store.create_media("video/mp4", 4096);
        store.finalize_media(&video.id).unwrap();

        let mut last = 0;
        loop {
            let polled = store.media_status(&video.id).unwrap();
            let processing = polled.processing.clone().unwrap();
            assert!(processing.progress_percent >= last);
            last = processing.progress_percent;
            if processing.state == "succeeded" {
                assert_eq!(processing.progress_percent, 100);
                assert!(polled.ready());
                break;
            }
            assert_eq!(processing.state, "in_progress");
            assert!(!polled.ready());
        }

        // further polls stay at succeeded/100
        let settled = store.media_status(&video.id).unwrap();
        assert_eq!(settled.processing.unwrap().progress_percent, 100);
    }

    #[test]
    fn append_accumulates_and_missing_ids_error() {
        let store = Store::new();
        let photo = store.create_media("image/jpeg", 0);
        store.append_media(&photo.id, 500).unwrap();
        store.append_media(&photo.id, 500).unwrap();
        assert_eq!(store.get_media(&photo.id).unwrap().size_bytes, 1000);

        assert!(store.append_media("404404", 1).is_err());
        assert!(store.media_status("404404").is_err());
    }

    #[test]
    fn images_finalize_without_processing_info() {
        let store = Store::new();
        let photo = store.create_media("image/png", 10);
        let finalized = store.finalize_media(&photo.id).unwrap();
        assert!(finalized.processing.is_none());
        let polled = store.media_status(&photo.id).unwrap();
        assert!(polled.processing.is_none());
    }
}
