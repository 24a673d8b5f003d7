//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use crate::module::ModuleDescriptor;
use edgesync_protocol::CodecKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Longest remote backoff the cron loop will wait out in-process.
pub const DEFAULT_CRON_HORIZON_SECS: u64 = 15;

/// Whether this site may talk to the remote at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteStatus {
    /// The link to the remote store is established.
    pub link_active: bool,
    /// The site was explicitly put in offline mode.
    pub offline_mode: bool,
    /// The site is a staging copy.
    pub staging: bool,
}

impl SiteStatus {
    /// A linked production site.
    pub fn connected() -> Self {
        Self {
            link_active: true,
            offline_mode: false,
            staging: false,
        }
    }

    /// A site with no link.
    pub fn disconnected() -> Self {
        Self {
            link_active: false,
            offline_mode: false,
            staging: false,
        }
    }

    /// Returns true when replication is permitted.
    pub fn allows_sync(&self) -> bool {
        self.link_active && !self.offline_mode && !self.staging
    }
}

impl Default for SiteStatus {
    fn default() -> Self {
        Self::connected()
    }
}

/// One local event and the action name it is queued under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMapping {
    /// Event name emitted by the host.
    pub event: String,
    /// Action name written to the queue.
    pub action: String,
}

/// The events the listener subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCatalog {
    mappings: Vec<EventMapping>,
}

impl EventCatalog {
    /// A catalog with no events.
    pub fn empty() -> Self {
        Self {
            mappings: Vec::new(),
        }
    }

    /// Adds (or remaps) an event.
    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>, action: impl Into<String>) -> Self {
        let event = event.into();
        let action = action.into();
        match self.mappings.iter_mut().find(|m| m.event == event) {
            Some(existing) => existing.action = action,
            None => self.mappings.push(EventMapping { event, action }),
        }
        self
    }

    /// Action name for an event.
    pub fn action_for(&self, event: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.event == event)
            .map(|m| m.action.as_str())
    }

    /// All mappings in registration order.
    pub fn mappings(&self) -> &[EventMapping] {
        &self.mappings
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns true if no events are mapped.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl Default for EventCatalog {
    fn default() -> Self {
        Self::empty()
            .with_event("option.added", "add_option")
            .with_event("option.updated", "update_option")
            .with_event("option.deleted", "delete_option")
            .with_event("post.saved", "save_post")
            .with_event("post.deleted", "delete_post")
            .with_event("comment.inserted", "insert_comment")
            .with_event("comment.edited", "edit_comment")
            .with_event("comment.deleted", "delete_comment")
            .with_event("user.registered", "register_user")
            .with_event("user.updated", "update_user")
            .with_event("user.deleted", "delete_user")
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Link and mode of the site.
    pub site: SiteStatus,
    /// Forces sync on and starts listener and sender on every invocation.
    pub test_mode: bool,
    /// Payload codec.
    pub codec: CodecKind,
    /// Maximum entries per transmitted batch.
    pub batch_max_items: usize,
    /// Maximum serialized bytes per transmitted batch.
    pub batch_max_bytes: usize,
    /// Items per full-sync chunk.
    pub full_sync_chunk_size: usize,
    /// Chunks a single invocation may enqueue; `None` enumerates everything.
    pub full_sync_chunks_per_invocation: Option<usize>,
    /// Delay before a requested full sync runs.
    pub full_sync_delay_secs: u64,
    /// Upper bound on time the cron loop spends in one invocation.
    pub cron_horizon_secs: u64,
    /// Interval of the recurring drain job.
    pub cron_interval_secs: u64,
    /// Interval of the recurring checksum job.
    pub checksum_interval_secs: u64,
    /// Events the listener captures.
    pub events: EventCatalog,
    /// Modules known to tooling that runs without the host's registry.
    pub modules: Vec<ModuleDescriptor>,
}

impl SyncConfig {
    /// Creates a configuration with defaults for a linked site.
    pub fn new() -> Self {
        Self {
            site: SiteStatus::connected(),
            test_mode: false,
            codec: CodecKind::Cbor,
            batch_max_items: 100,
            batch_max_bytes: 512 * 1024,
            full_sync_chunk_size: 100,
            full_sync_chunks_per_invocation: None,
            full_sync_delay_secs: 1,
            cron_horizon_secs: DEFAULT_CRON_HORIZON_SECS,
            cron_interval_secs: 60,
            checksum_interval_secs: 3600,
            events: EventCatalog::default(),
            modules: default_modules(),
        }
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> SyncResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&bytes)
    }

    /// Parses a configuration from JSON. Missing fields take defaults.
    pub fn from_json(bytes: &[u8]) -> SyncResult<Self> {
        let config: Self =
            serde_json::from_slice(bytes).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects limits that would stall the engine.
    pub fn validate(&self) -> SyncResult<()> {
        if self.batch_max_items == 0 {
            return Err(SyncError::Config("batch_max_items must be positive".into()));
        }
        if self.full_sync_chunk_size == 0 {
            return Err(SyncError::Config(
                "full_sync_chunk_size must be positive".into(),
            ));
        }
        if self.full_sync_chunks_per_invocation == Some(0) {
            return Err(SyncError::Config(
                "full_sync_chunks_per_invocation must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Whether replication may run: linked, online and not staging, or test mode.
    pub fn sync_allowed(&self) -> bool {
        self.test_mode || self.site.allows_sync()
    }

    /// Sets the site status.
    pub fn with_site(mut self, site: SiteStatus) -> Self {
        self.site = site;
        self
    }

    /// Enables or disables test mode.
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Sets the payload codec.
    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the batch limits.
    pub fn with_batch_limits(mut self, max_items: usize, max_bytes: usize) -> Self {
        self.batch_max_items = max_items;
        self.batch_max_bytes = max_bytes;
        self
    }

    /// Sets the full-sync chunk size.
    pub fn with_full_sync_chunk_size(mut self, size: usize) -> Self {
        self.full_sync_chunk_size = size;
        self
    }

    /// Caps the chunks one invocation enqueues.
    pub fn with_full_sync_chunks_per_invocation(mut self, chunks: usize) -> Self {
        self.full_sync_chunks_per_invocation = Some(chunks);
        self
    }

    /// Sets the cron loop horizon.
    pub fn with_cron_horizon_secs(mut self, secs: u64) -> Self {
        self.cron_horizon_secs = secs;
        self
    }

    /// Replaces the event catalog.
    pub fn with_events(mut self, events: EventCatalog) -> Self {
        self.events = events;
        self
    }
}

fn default_modules() -> Vec<ModuleDescriptor> {
    [
        ("comments", "Comments and their metadata"),
        ("options", "Site options"),
        ("posts", "Posts, pages and their metadata"),
        ("users", "Users and roles"),
    ]
    .into_iter()
    .map(|(name, description)| ModuleDescriptor {
        name: name.to_string(),
        description: description.to_string(),
    })
    .collect()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
