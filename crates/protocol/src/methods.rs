//! RPC method and event names exposed by the gateway.
//!
//! The business logic behind each method is owned by the gateway; these
//! are wire-contract strings only. Params and results are opaque JSON
//! except for the chat payloads in [`crate::chat`].

pub const HEALTH: &str = "health";

pub const CHANNELS_STATUS: &str = "channels.status";
pub const CHANNELS_LOGOUT: &str = "channels.logout";

pub const MODELS_LIST: &str = "models.list";

pub const AGENTS_LIST: &str = "agents.list";
pub const AGENTS_CREATE: &str = "agents.create";
pub const AGENTS_UPDATE: &str = "agents.update";
pub const AGENTS_DELETE: &str = "agents.delete";

pub const SESSIONS_LIST: &str = "sessions.list";
pub const SESSIONS_DELETE: &str = "sessions.delete";
pub const SESSIONS_RESET: &str = "sessions.reset";
pub const SESSIONS_COMPACT: &str = "sessions.compact";

pub const NODE_LIST: &str = "node.list";
pub const NODE_RENAME: &str = "node.rename";

pub const DEVICE_PAIR_LIST: &str = "device.pair.list";
pub const DEVICE_PAIR_APPROVE: &str = "device.pair.approve";
pub const DEVICE_PAIR_REJECT: &str = "device.pair.reject";
pub const DEVICE_PAIR_REMOVE: &str = "device.pair.remove";

pub const CRON_LIST: &str = "cron.list";
pub const CRON_RUN: &str = "cron.run";
pub const CRON_REMOVE: &str = "cron.remove";
pub const CRON_UPDATE: &str = "cron.update";

pub const CONFIG_GET: &str = "config.get";
pub const CONFIG_SET: &str = "config.set";

pub const LOGS_TAIL: &str = "logs.tail";

pub const SKILLS_STATUS: &str = "skills.status";

pub const TTS_STATUS: &str = "tts.status";
pub const TTS_PROVIDERS: &str = "tts.providers";
pub const TTS_ENABLE: &str = "tts.enable";
pub const TTS_DISABLE: &str = "tts.disable";
pub const TTS_SET_PROVIDER: &str = "tts.setProvider";
pub const TTS_CONVERT: &str = "tts.convert";

pub const TALK_CONFIG: &str = "talk.config";
pub const TALK_MODE: &str = "talk.mode";

pub const CHAT_SEND: &str = "chat.send";
pub const CHAT_ABORT: &str = "chat.abort";
pub const CHAT_HISTORY: &str = "chat.history";

// ── Event names ──────────────────────────────────────────────────────

pub const EVENT_HEALTH: &str = "health";
pub const EVENT_CRON: &str = "cron";
pub const EVENT_CHAT: &str = "chat";
