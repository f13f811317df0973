// gateway: Controller-side relay daemon.

pub mod config;
