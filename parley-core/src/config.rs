//! Runtime configuration snapshot.
//!
//! Options are read from a TOML document, either as an `[OllamaChat]` table
//! or as dotted keys (`OllamaChat.SayDistance = 30.0`). Every option has a
//! documented default; a missing option silently takes it and an invalid one
//! takes it with a warning. Loading never fails on bad option values.
//!
//! ```toml
//! [OllamaChat]
//! SayDistance = 30.0
//! PlayerReplyChance = 90
//! Model = "llama3.2:1b"
//! BlacklistCommands = "guild invite, trade"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{Channel, SenderKind};

/// Name of the TOML table holding the options.
pub const SECTION: &str = "OllamaChat";

/// Command prefixes that must never trigger a generated reply.
///
/// `"destroy"` and `"s"` are separate entries.
pub const DEFAULT_BLACKLIST: &[&str] = &[
    ".playerbots",
    "playerbot",
    "autogear",
    "talents",
    "reset botAI",
    "summon",
    "release",
    "revive",
    "leave",
    "attack",
    "follow",
    "flee",
    "stay",
    "runaway",
    "grind",
    "disperse",
    "give leader",
    "spells",
    "cast",
    "quests",
    "accept",
    "drop",
    "talk",
    "reset",
    "ss",
    "trainer",
    "rti",
    "rtsc",
    "do",
    "ll",
    "e",
    "ue",
    "nc",
    "open",
    "destroy",
    "s",
    "b",
    "bank",
    "gb",
    "u",
    "co",
];

// ---------------------------------------------------------------------------
// Blacklist
// ---------------------------------------------------------------------------

/// Ordered, duplicate-free set of command prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Blacklist {
    tokens: Vec<String>,
}

impl Blacklist {
    /// An empty blacklist.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in command prefixes.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut list = Self::empty();
        for token in DEFAULT_BLACKLIST {
            list.insert(token);
        }
        list
    }

    /// Add one token. Whitespace is trimmed; empty and duplicate tokens
    /// are ignored. Returns whether the list changed.
    pub fn insert(&mut self, token: &str) -> bool {
        let token = token.trim();
        if token.is_empty() || self.tokens.iter().any(|t| t == token) {
            return false;
        }
        self.tokens.push(token.to_string());
        true
    }

    /// Append every token of a comma-separated list.
    pub fn extend_from_csv(&mut self, csv: &str) {
        for token in csv.split(',') {
            self.insert(token);
        }
    }

    /// The first token `message` starts with, after trimming the message.
    #[must_use]
    pub fn matching_prefix(&self, message: &str) -> Option<&str> {
        let message = message.trim();
        self.tokens
            .iter()
            .find(|t| message.starts_with(t.as_str()))
            .map(String::as_str)
    }

    /// Whether `message` starts with any token.
    #[must_use]
    pub fn blocks(&self, message: &str) -> bool {
        self.matching_prefix(message).is_some()
    }

    /// Tokens in insertion order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether there are no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ConfigSnapshot
// ---------------------------------------------------------------------------

/// Immutable set of runtime parameters.
///
/// A reload builds a new snapshot and swaps it in whole through
/// [`crate::shared::SharedConfig`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSnapshot {
    /// Proximity threshold for the say channel.
    pub say_distance: f32,
    /// Proximity threshold for the yell channel.
    pub yell_distance: f32,
    /// Proximity threshold for the general channel.
    pub general_distance: f32,
    /// Percent chance a bot answers a real player.
    pub player_reply_chance: u32,
    /// Percent chance a bot answers another bot.
    pub bot_reply_chance: u32,
    /// Cap on responders per event.
    pub max_bots_to_pick: u32,
    /// Backend generate endpoint.
    pub backend_url: String,
    /// Backend model identifier.
    pub model: String,
    /// Admission ceiling; 0 means unlimited.
    pub max_concurrent_queries: u32,
    /// Whether ambient chatter runs at all.
    pub enable_random_chatter: bool,
    /// Shortest ambient interval, seconds.
    pub min_random_interval: u32,
    /// Longest ambient interval, seconds.
    pub max_random_interval: u32,
    /// How close a real player must be for a bot to chatter.
    pub random_chatter_distance: f32,
    /// Percent chance an eligible bot comments on a chatter tick.
    pub random_chatter_chance: u32,
    /// Whether personas are looked up per responder.
    pub enable_personalities: bool,
    /// Command prefixes that never trigger replies.
    pub blacklist: Blacklist,
    /// Bounded wait for a single query, milliseconds.
    pub request_timeout_ms: u64,
    /// Longest a query may wait for admission before it is dropped,
    /// milliseconds.
    pub queue_timeout_ms: u64,
    /// `keep_alive` sent with per-query calls, seconds.
    pub query_keep_alive: i64,
    /// Bounded wait for preload/unload, milliseconds.
    pub lifecycle_timeout_ms: u64,
    /// SQLite file holding the personality table.
    pub personality_database: Option<PathBuf>,
    /// `Cookie` header sent with backend calls.
    pub session_cookie: Option<String>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            say_distance: 30.0,
            yell_distance: 100.0,
            general_distance: 600.0,
            player_reply_chance: 90,
            bot_reply_chance: 10,
            max_bots_to_pick: 2,
            backend_url: "http://localhost:11434/api/generate".to_string(),
            model: "llama3.2:1b".to_string(),
            max_concurrent_queries: 0,
            enable_random_chatter: true,
            min_random_interval: 45,
            max_random_interval: 180,
            random_chatter_distance: 40.0,
            random_chatter_chance: 25,
            enable_personalities: false,
            blacklist: Blacklist::with_defaults(),
            request_timeout_ms: 30_000,
            queue_timeout_ms: 10_000,
            query_keep_alive: 300,
            lifecycle_timeout_ms: 120_000,
            personality_database: None,
            session_cookie: None,
        }
    }
}

impl ConfigSnapshot {
    /// Build a snapshot from a TOML string.
    ///
    /// A document that does not parse is logged and treated as empty, so
    /// every option takes its default.
    #[must_use]
    pub fn from_toml(toml_str: &str) -> Self {
        match toml_str.parse::<toml::Table>() {
            Ok(table) => Self::from_table(&table),
            Err(e) => {
                warn!(error = %e, "Config document is not valid TOML, using defaults");
                Self::from_table(&toml::Table::new())
            }
        }
    }

    /// Build a snapshot from a TOML file.
    ///
    /// # Errors
    /// Returns an error only if the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&content))
    }

    /// Build a snapshot from an already parsed TOML table.
    #[must_use]
    pub fn from_table(root: &toml::Table) -> Self {
        let d = Self::default();
        let r = OptionReader::new(root);

        let mut blacklist = Blacklist::with_defaults();
        let extra = r.string("BlacklistCommands", "");
        blacklist.extend_from_csv(&extra);

        let mut config = Self {
            say_distance: r.distance("SayDistance", d.say_distance),
            yell_distance: r.distance("YellDistance", d.yell_distance),
            general_distance: r.distance("GeneralDistance", d.general_distance),
            player_reply_chance: r.chance("PlayerReplyChance", d.player_reply_chance),
            bot_reply_chance: r.chance("BotReplyChance", d.bot_reply_chance),
            max_bots_to_pick: r.u32("MaxBotsToPick", d.max_bots_to_pick),
            backend_url: r.string("Url", &d.backend_url),
            model: r.string("Model", &d.model),
            max_concurrent_queries: r.u32("MaxConcurrentQueries", d.max_concurrent_queries),
            enable_random_chatter: r.bool("EnableRandomChatter", d.enable_random_chatter),
            min_random_interval: r.u32("MinRandomInterval", d.min_random_interval),
            max_random_interval: r.u32("MaxRandomInterval", d.max_random_interval),
            random_chatter_distance: r
                .distance("RandomChatterRealPlayerDistance", d.random_chatter_distance),
            random_chatter_chance: r.chance("RandomChatterBotCommentChance", d.random_chatter_chance),
            enable_personalities: r.bool("EnableRPPersonalities", d.enable_personalities),
            blacklist,
            request_timeout_ms: r.millis("RequestTimeoutMs", d.request_timeout_ms),
            queue_timeout_ms: r.millis("QueueTimeoutMs", d.queue_timeout_ms),
            query_keep_alive: r.i64("QueryKeepAlive", d.query_keep_alive),
            lifecycle_timeout_ms: r.millis("LifecycleTimeoutMs", d.lifecycle_timeout_ms),
            personality_database: r.optional_string("PersonalityDatabase").map(PathBuf::from),
            session_cookie: r.optional_string("SessionCookie"),
        };

        if config.min_random_interval > config.max_random_interval {
            warn!(
                min = config.min_random_interval,
                max = config.max_random_interval,
                "MinRandomInterval exceeds MaxRandomInterval, swapping"
            );
            std::mem::swap(&mut config.min_random_interval, &mut config.max_random_interval);
        }

        if config.query_keep_alive <= 0 {
            warn!(
                value = config.query_keep_alive,
                "QueryKeepAlive must be positive, using default"
            );
            config.query_keep_alive = d.query_keep_alive;
        }

        config.log_summary(&extra);
        config
    }

    fn log_summary(&self, extra_blacklist: &str) {
        info!(
            say_distance = self.say_distance,
            yell_distance = self.yell_distance,
            general_distance = self.general_distance,
            player_reply_chance = self.player_reply_chance,
            bot_reply_chance = self.bot_reply_chance,
            max_bots_to_pick = self.max_bots_to_pick,
            url = %self.backend_url,
            model = %self.model,
            max_concurrent_queries = self.max_concurrent_queries,
            request_timeout_ms = self.request_timeout_ms,
            queue_timeout_ms = self.queue_timeout_ms,
            random_chatter = self.enable_random_chatter,
            min_random_interval = self.min_random_interval,
            max_random_interval = self.max_random_interval,
            random_chatter_distance = self.random_chatter_distance,
            random_chatter_chance = self.random_chatter_chance,
            personalities = self.enable_personalities,
            extra_blacklist = %extra_blacklist,
            "Chat config loaded"
        );
    }

    /// Proximity threshold for a channel.
    #[must_use]
    pub fn distance_for(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Say => self.say_distance,
            Channel::Yell => self.yell_distance,
            Channel::General => self.general_distance,
        }
    }

    /// Reply chance for a message from `kind`, clamped to 100.
    #[must_use]
    pub fn reply_chance(&self, kind: SenderKind) -> u32 {
        match kind {
            SenderKind::Player => self.player_reply_chance,
            SenderKind::Bot => self.bot_reply_chance,
        }
        .min(100)
    }

    /// Per-query timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Admission wait limit.
    #[must_use]
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    /// Preload/unload timeout.
    #[must_use]
    pub fn lifecycle_timeout(&self) -> Duration {
        Duration::from_millis(self.lifecycle_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Option reader
// ---------------------------------------------------------------------------

/// Looks options up in the `[OllamaChat]` table, falling back to the
/// document root, and resolves bad values to defaults.
struct OptionReader<'a> {
    root: &'a toml::Table,
    section: Option<&'a toml::Table>,
}

impl<'a> OptionReader<'a> {
    fn new(root: &'a toml::Table) -> Self {
        let section = root.get(SECTION).and_then(toml::Value::as_table);
        Self { root, section }
    }

    fn value(&self, key: &str) -> Option<&'a toml::Value> {
        self.section
            .and_then(|s| s.get(key))
            .or_else(|| self.root.get(key))
    }

    fn invalid<T: std::fmt::Debug>(key: &str, value: &toml::Value, default: T) -> T {
        warn!(option = key, value = %value, default = ?default, "Invalid option value, using default");
        default
    }

    fn f32(&self, key: &str, default: f32) -> f32 {
        match self.value(key) {
            None => default,
            #[allow(clippy::cast_possible_truncation)]
            Some(toml::Value::Float(f)) => *f as f32,
            #[allow(clippy::cast_precision_loss)]
            Some(toml::Value::Integer(i)) => *i as f32,
            Some(v) => Self::invalid(key, v, default),
        }
    }

    fn distance(&self, key: &str, default: f32) -> f32 {
        let value = self.f32(key, default);
        if value.is_finite() && value >= 0.0 {
            value
        } else {
            warn!(option = key, value, default, "Distance must be non-negative, using default");
            default
        }
    }

    fn i64(&self, key: &str, default: i64) -> i64 {
        match self.value(key) {
            None => default,
            Some(toml::Value::Integer(i)) => *i,
            Some(v) => Self::invalid(key, v, default),
        }
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        match self.value(key) {
            None => default,
            Some(v @ toml::Value::Integer(i)) => {
                u64::try_from(*i).unwrap_or_else(|_| Self::invalid(key, v, default))
            }
            Some(v) => Self::invalid(key, v, default),
        }
    }

    /// A duration in milliseconds; zero would expire every call at once.
    fn millis(&self, key: &str, default: u64) -> u64 {
        match self.u64(key, default) {
            0 => {
                warn!(option = key, default, "Timeout must be positive, using default");
                default
            }
            value => value,
        }
    }

    fn u32(&self, key: &str, default: u32) -> u32 {
        match self.value(key) {
            None => default,
            Some(v @ toml::Value::Integer(i)) => {
                u32::try_from(*i).unwrap_or_else(|_| Self::invalid(key, v, default))
            }
            Some(v) => Self::invalid(key, v, default),
        }
    }

    fn chance(&self, key: &str, default: u32) -> u32 {
        let value = self.u32(key, default);
        if value > 100 {
            warn!(option = key, value, "Chance above 100%, clamping");
            100
        } else {
            value
        }
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.value(key) {
            None => default,
            Some(toml::Value::Boolean(b)) => *b,
            Some(v) => Self::invalid(key, v, default),
        }
    }

    fn string(&self, key: &str, default: &str) -> String {
        match self.value(key) {
            None => default.to_string(),
            Some(toml::Value::String(s)) => s.clone(),
            Some(v) => Self::invalid(key, v, default.to_string()),
        }
    }

    fn optional_string(&self, key: &str) -> Option<String> {
        let value = self.string(key, "");
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
