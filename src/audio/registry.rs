use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::pipeline::StreamingPipeline;
use super::queue::{AudioEntry, QueueSnapshot, QueueState};
use super::scheduler::{self, DrainContext};
use super::session::{AudioSession, PlaybackState};
use crate::error::{PlaybackError, Result};
use crate::sources::SourceResolver;
use crate::transport::Transport;

/// Queue and session of one guild.
///
/// Only [`GuildRegistry`] and the drain loop it spawns hold these. Both
/// locks are held for a read or a mutation, never across an await. When
/// both are needed `queue` is taken first.
pub(crate) struct TenantRecord {
    queue: Mutex<QueueState>,
    session: Mutex<Arc<AudioSession>>,
}

impl TenantRecord {
    fn new() -> Self {
        Self {
            queue: Mutex::new(QueueState::new()),
            session: Mutex::new(Arc::new(AudioSession::new())),
        }
    }

    pub(crate) fn session(&self) -> Arc<AudioSession> {
        self.session.lock().clone()
    }

    /// Current session, replaced by a new one if it reached `Stopped`.
    /// The replacement inherits the transport so teardown can still
    /// disconnect it. A retired guild never gets a new session.
    pub(crate) fn fresh_session(&self) -> Arc<AudioSession> {
        let queue = self.queue.lock();
        let mut slot = self.session.lock();
        if slot.is_stopped() && !queue.is_retired() {
            let session = AudioSession::new();
            if let Some(transport) = slot.transport() {
                session.bind_transport(transport);
            }
            debug!("🆕 Session {} created", session.id());
            *slot = Arc::new(session);
        }
        slot.clone()
    }

    pub(crate) fn next_for_drain(&self) -> Option<AudioEntry> {
        self.queue.lock().next_for_drain()
    }

    pub(crate) fn finish_current(&self) {
        self.queue.lock().finish_current();
    }

    pub(crate) fn release_drain(&self) {
        self.queue.lock().release_drain();
    }

    /// Empties the queue for good and stops the session. Returns the bound transport.
    async fn retire(&self) -> Option<Arc<dyn Transport>> {
        let session = {
            let mut queue = self.queue.lock();
            queue.retire();
            self.session.lock().clone()
        };
        session.stop().await;
        session.transport()
    }
}

/// Result of [`GuildRegistry::enqueue`].
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub snapshot: QueueSnapshot,
    pub session: Arc<AudioSession>,
    idle: bool,
}

impl Enqueued {
    /// No drain loop owned the guild at enqueue time; the caller should
    /// [`GuildRegistry::play`].
    pub fn is_idle(&self) -> bool {
        self.idle
    }
}

/// Owns every guild's queue and session.
///
/// Cloning is cheap and shares the same guilds. The map lock is only held to
/// insert, look up or remove a record.
#[derive(Clone)]
pub struct GuildRegistry {
    tenants: Arc<DashMap<String, Arc<TenantRecord>>>,
    resolver: Arc<dyn SourceResolver>,
    pipeline: Arc<StreamingPipeline>,
}

impl GuildRegistry {
    pub fn new(resolver: Arc<dyn SourceResolver>, pipeline: Arc<StreamingPipeline>) -> Self {
        info!("🎵 Guild registry initialised");
        Self {
            tenants: Arc::new(DashMap::new()),
            resolver,
            pipeline,
        }
    }

    fn get_or_create(&self, guild: &str) -> Arc<TenantRecord> {
        if let Some(record) = self.tenants.get(guild) {
            return record.clone();
        }
        self.tenants
            .entry(guild.to_string())
            .or_insert_with(|| {
                info!("🆕 [{}] Guild state created", guild);
                Arc::new(TenantRecord::new())
            })
            .clone()
    }

    fn get(&self, guild: &str) -> Result<Arc<TenantRecord>> {
        self.tenants
            .get(guild)
            .map(|record| record.clone())
            .ok_or_else(|| PlaybackError::NotFound(guild.to_string()))
    }

    /// Appends an entry, creating the guild on first use.
    ///
    /// A session that already reached `Stopped` is replaced by a new one.
    pub fn enqueue(
        &self,
        guild: &str,
        audio_ref: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Enqueued {
        let record = self.get_or_create(guild);

        let (snapshot, idle) = {
            let mut queue = record.queue.lock();
            queue.push_back(AudioEntry::new(audio_ref, requested_by));
            (queue.snapshot(), !queue.is_draining())
        };

        Enqueued {
            snapshot,
            session: record.fresh_session(),
            idle,
        }
    }

    /// Starts the guild's drain loop on `transport` unless one already runs.
    ///
    /// Returns whether a loop was spawned.
    pub fn play(&self, guild: &str, transport: Arc<dyn Transport>) -> Result<bool> {
        let record = self.get(guild)?;

        if !record.queue.lock().claim_drain() {
            debug!("[{}] Drain loop already running", guild);
            return Ok(false);
        }

        record.fresh_session().bind_transport(transport.clone());

        tokio::spawn(scheduler::drain(DrainContext {
            guild: guild.to_string(),
            record,
            transport,
            resolver: self.resolver.clone(),
            pipeline: self.pipeline.clone(),
        }));
        Ok(true)
    }

    pub fn snapshot(&self, guild: &str) -> Result<QueueSnapshot> {
        Ok(self.get(guild)?.queue.lock().snapshot())
    }

    pub fn shuffle(&self, guild: &str) -> Result<()> {
        self.get(guild)?.queue.lock().shuffle();
        Ok(())
    }

    pub fn toggle_loop(&self, guild: &str) -> Result<bool> {
        Ok(self.get(guild)?.queue.lock().toggle_loop())
    }

    /// Drops pending entries and the current pointer. The session keeps playing;
    /// call [`GuildRegistry::stop`] as well to silence it.
    pub fn clear(&self, guild: &str) -> Result<()> {
        self.get(guild)?.queue.lock().clear();
        Ok(())
    }

    pub fn clear_current(&self, guild: &str) -> Result<()> {
        self.get(guild)?.queue.lock().clear_current();
        Ok(())
    }

    pub fn pop_front(&self, guild: &str) -> Result<Option<AudioEntry>> {
        Ok(self.get(guild)?.queue.lock().pop_front())
    }

    pub fn pause(&self, guild: &str) -> Result<bool> {
        Ok(self.get(guild)?.session().pause())
    }

    pub fn resume(&self, guild: &str) -> Result<bool> {
        Ok(self.get(guild)?.session().resume())
    }

    /// Stops the current session. A running drain loop moves on to the next entry.
    pub async fn stop(&self, guild: &str) -> Result<bool> {
        let session = self.get(guild)?.session();
        Ok(session.stop().await)
    }

    pub fn state(&self, guild: &str) -> Result<PlaybackState> {
        Ok(self.get(guild)?.session().state())
    }

    /// Whether a drain loop currently owns the guild.
    pub fn is_active(&self, guild: &str) -> bool {
        self.tenants
            .get(guild)
            .map(|record| record.queue.lock().is_draining())
            .unwrap_or(false)
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    /// Removes the guild, stopping its session and disconnecting its transport.
    pub async fn delete_tenant(&self, guild: &str) -> bool {
        let Some((_, record)) = self.tenants.remove(guild) else {
            return false;
        };

        if let Some(transport) = record.retire().await {
            transport.disconnect().await;
        }
        info!("🗑️ [{}] Guild state removed", guild);
        true
    }

    /// Graceful shutdown: stops every session and clears all guild state,
    /// then disconnects the transports.
    pub async fn stop_all(&self) {
        let mut records = Vec::new();
        self.tenants.retain(|_, record| {
            records.push(record.clone());
            false
        });

        let mut transports = Vec::new();
        for record in &records {
            if let Some(transport) = record.retire().await {
                transports.push(transport);
            }
        }

        for transport in transports {
            transport.disconnect().await;
        }

        info!("⏹️ Stopped {} guild(s)", records.len());
    }
}
