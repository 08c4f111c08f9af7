//! Pure parsers over captured git output

pub mod config;
pub mod ignore;
pub mod refs;
pub mod status;

pub use config::{parse_config_list, parse_config_value, ConfigEntry, ConfigError, ConfigScope, ConfigValue};
pub use ignore::{parse_check_ignore, parse_path_list};
pub use refs::{
    parse_ahead_behind, parse_refs, parse_remotes, parse_stash_list, parse_upstream, GitRef, RefKind, Remote,
    Stash, Upstream, REF_FORMAT,
};
pub use status::{parse_status, FileStatusEntry, StatusParser};
