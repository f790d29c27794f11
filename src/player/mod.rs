//! The media element: one `mpv` process driven over its JSON IPC socket.

pub mod mpv;

pub use mpv::MpvHandle;
