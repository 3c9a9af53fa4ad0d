// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The stateful heart of the fake: an in-memory graph of every entity the
//! v2 surface can touch, behind one readers-writer lock.
//!
//! Entities are id-indexed arenas; every cyclic relationship (user follows
//! user, tweet quotes tweet) is a pair of mirrored id *sets*, never a
//! pointer, and every mutation repairs both sides under the write lock.
//! Handlers only ever see shallow copies. The other standing rule is
//! idempotence: creates and adds that already happened report success, and
//! deletes of something absent report the `false` envelope rather than an
//! error, because that is what the production service does.
//!
//! The per-domain operation sets live in the submodules (`user`, `tweet`,
//! `list`, ...) as separate `impl Store` blocks; this module owns the
//! collections, the id generator, the credit-usage samples, and the
//! streaming-connection registry.

pub mod direct;
pub mod import;
pub mod list;
pub mod media;
pub mod misc;
pub mod rules;
pub mod space;
pub mod tweet;
pub mod user;

pub use self::direct::{DmConversation, DmEvent};
pub use self::list::List;
pub use self::media::{Media, MediaProcessing};
pub use self::misc::{Community, ComplianceJob, Note, PersonalizedTrend, Place, Poll, Trend};
pub use self::rules::{RuleOutcome, StreamRule};
pub use self::space::Space;
pub use self::tweet::{RefType, Tweet, TweetDraft, TweetReference};
pub use self::user::User;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::Cancel;

/// Twitter's snowflake epoch (2010-11-04T01:42:54.657Z), in Unix millis.
const SNOWFLAKE_EPOCH_MS: u64 = 1_288_834_974_657;

/// Issues snowflake-shaped, monotonically non-decreasing decimal ids.
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> IdGenerator {
        IdGenerator {
            last: AtomicU64::new(Self::snowflake_now()),
        }
    }

    fn snowflake_now() -> u64 {
        let now_ms = chrono::Utc::now().timestamp_millis() as u64;
        now_ms.saturating_sub(SNOWFLAKE_EPOCH_MS) << 22
    }

    /// The next id: at least one past the previous, at least the current
    /// wall-clock snowflake.
    pub fn next(&self) -> String {
        let mut fresh = 0;
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                fresh = (last + 1).max(Self::snowflake_now());
                Some(fresh)
            })
            .expect("fetch_update closure never returns None");
        fresh.to_string()
    }
}

/// Every collection the store owns; guarded as one unit.
#[derive(Default)]
pub(crate) struct Collections {
    pub users: BTreeMap<String, User>,
    pub tweets: BTreeMap<String, Tweet>,
    pub lists: BTreeMap<String, List>,
    pub spaces: BTreeMap<String, Space>,
    /// Keyed by media key; lookups by numeric media id scan.
    pub media: BTreeMap<String, Media>,
    pub dm_conversations: BTreeMap<String, DmConversation>,
    pub dm_events: BTreeMap<String, DmEvent>,
    pub communities: BTreeMap<String, Community>,
    pub notes: BTreeMap<String, Note>,
    pub polls: BTreeMap<String, Poll>,
    pub places: BTreeMap<String, Place>,
    pub compliance_jobs: BTreeMap<String, ComplianceJob>,
    pub trends: BTreeMap<u32, Vec<Trend>>,
    pub personalized_trends: Vec<PersonalizedTrend>,
    pub rules: Vec<StreamRule>,
}

/// One registered streaming connection, tracked for bulk tear-down.
pub struct StreamConnection {
    pub token: u64,
    pub fingerprint: String,
    pub cancel: Cancel,
}

/// The domain store. One instance per server, shared by reference.
pub struct Store {
    inner: RwLock<Collections>,
    ids: IdGenerator,
    usage: Mutex<HashMap<String, u64>>,
    connections: Mutex<Vec<StreamConnection>>,
    connection_tokens: AtomicU64,
}

impl Store {
    /// An empty store; [`Store::seeded`] is what servers normally want.
    pub fn new() -> Store {
        Store {
            inner: RwLock::new(Collections::default()),
            ids: IdGenerator::new(),
            usage: Mutex::new(HashMap::new()),
            connections: Mutex::new(Vec::new()),
            connection_tokens: AtomicU64::new(1),
        }
    }

    /// A store populated with the well-known default user (id `"0"`), a
    /// few companions, and enough tweets and trends that every read
    /// endpoint has something to say.
    pub fn seeded() -> Store {
        let store = Store::new();
        store.seed();
        store
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.inner.read().unwrap()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.inner.write().unwrap()
    }

    /// Issues the next snowflake id.
    pub fn next_id(&self) -> String {
        self.ids.next()
    }

    /// Records a served-request credit sample for a credential.
    pub fn record_usage(&self, fingerprint: &str, requests: u64) {
        let mut usage = self.usage.lock().unwrap();
        *usage.entry(fingerprint.to_string()).or_insert(0) += requests;
    }

    /// The credit samples recorded for one credential.
    pub fn usage_of(&self, fingerprint: &str) -> u64 {
        self.usage.lock().unwrap().get(fingerprint).copied().unwrap_or(0)
    }

    /// Total samples across all credentials.
    pub fn project_usage(&self) -> u64 {
        self.usage.lock().unwrap().values().sum()
    }

    /// Registers a live streaming connection; the returned token releases
    /// it.
    pub fn register_connection(&self, fingerprint: &str, cancel: Cancel) -> u64 {
        let token = self.connection_tokens.fetch_add(1, Ordering::Relaxed);
        self.connections.lock().unwrap().push(StreamConnection {
            token,
            fingerprint: fingerprint.to_string(),
            cancel,
        });
        token
    }

    /// Drops the registry entry for a finished connection.
    pub fn release_connection(&self, token: u64) {
        self.connections
            .lock()
            .unwrap()
            .retain(|conn| conn.token != token);
    }

    /// Cancels and clears every tracked connection, returning how many
    /// were told to stop.
    pub fn close_all_connections(&self) -> usize {
        let mut connections = self.connections.lock().unwrap();
        for conn in connections.iter() {
            conn.cancel.cancel();
        }
        let closed = connections.len();
        connections.clear();
        closed
    }

    /// Number of currently tracked streaming connections.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// Entity counts for `/health`.
    pub fn census(&self) -> Vec<(&'static str, usize)> {
        let inner = self.read();
        vec![
            ("users", inner.users.len()),
            ("tweets", inner.tweets.len()),
            ("lists", inner.lists.len()),
            ("spaces", inner.spaces.len()),
            ("media", inner.media.len()),
            ("dm_events", inner.dm_events.len()),
            ("rules", inner.rules.len()),
        ]
    }

    fn seed(&self) {
        self.create_user_with_id("0", "mockingbird", "Mockingbird Dev")
            .expect("seeding the default user cannot fail on an empty store");
        self.create_user_with_id("1", "robin", "Robin Redbreast").unwrap();
        self.create_user_with_id("2", "wren", "Jenny Wren").unwrap();
        self.create_user_with_id("3", "finch", "Atticus Finch").unwrap();

        let seeds = [
            ("1", "Dawn chorus went well today. #birdsong"),
            ("2", "Just migrated 4000 miles, ask me anything."),
            ("1", "Hot take: suet is underrated."),
            ("3", "Nest architecture thread, part 1 of 12."),
            ("2", "@robin the chorus was lovely from over here too!"),
        ];
        for (author, text) in &seeds {
            self.create_tweet(TweetDraft::new(text), author)
                .expect("seed tweets reference seeded users");
        }

        {
            let mut inner = self.write();
            inner.trends.insert(
                1,
                vec![
                    Trend::new("#DawnChorus", 120_500),
                    Trend::new("Migration Season", 88_200),
                    Trend::new("#NestWatch", 41_000),
                ],
            );
            inner.personalized_trends = vec![
                PersonalizedTrend::new("#DawnChorus", "Trending in Birdsong", 120_500),
                PersonalizedTrend::new("Suet", "Food · Trending", 9_100),
            ];
            let community = Community::new("10001", "Backyard Birders", "0");
            inner.communities.insert(community.id.clone(), community);
        }

        let space = Space::new(self.next_id(), "Morning Migration Report", "1");
        self.write().spaces.insert(space.id.clone(), space);
    }
}

impl Default for Store {
    fn default() -> Store {
        Store::new()
    }
}
