//! Configuration section definitions.
//!
//! Each module corresponds to a section in `hotrelay.toml`:
//!
//! | Module  | TOML Section | Purpose                      |
//! |---------|--------------|------------------------------|
//! | `hmr`   | `[hmr]`      | Relay endpoints and behavior |
//! | `serve` | `[serve]`    | HTTP listener                |
//! | `watch` | `[watch]`    | Compiler stats watching      |

mod hmr;
mod serve;
mod watch;

pub use hmr::HmrConfig;
pub use serve::ServeConfig;
pub use watch::WatchConfig;
