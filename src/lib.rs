//! Workspace root. The real crates live under `crates/`.
