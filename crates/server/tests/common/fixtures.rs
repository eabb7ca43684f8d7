//! Link fixtures and a recording stats publisher.

use shortlink_core::{EnableStatus, FullShortUrl, ShortLink, ValidityMode};
use shortlink_server::stats::{AccessEvent, StatsPublisher};
use std::sync::Mutex;
use time::OffsetDateTime;

/// An enabled, permanent link on `s.ly` owned by `g1`.
#[allow(dead_code)]
pub fn link(short_uri: &str, origin_url: &str) -> ShortLink {
    let now = OffsetDateTime::now_utc();
    ShortLink {
        gid: "g1".to_string(),
        full_short_url: FullShortUrl::new("s.ly", short_uri).unwrap(),
        origin_url: origin_url.to_string(),
        validity: ValidityMode::Permanent,
        status: EnableStatus::Enabled,
        deleted: false,
        created_at: now,
        updated_at: now,
    }
}

/// Keeps every published event.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<AccessEvent>>,
}

#[allow(dead_code)]
impl RecordingPublisher {
    pub fn events(&self) -> Vec<AccessEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl StatsPublisher for RecordingPublisher {
    fn publish(&self, event: AccessEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Publisher whose backend is down.
#[allow(dead_code)]
pub struct FailingPublisher;

impl StatsPublisher for FailingPublisher {
    fn publish(&self, _event: AccessEvent) {
        panic!("statistics backend unreachable");
    }
}
