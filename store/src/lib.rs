//! Image acquisition pipeline for Dockyard.
//!
//! This crate fetches container images — from a Docker v2 registry or from a
//! local `docker save` archive — and materializes their layered filesystem
//! under an on-disk store, so a container runtime can stack the extracted
//! layer rootfs directories into a root filesystem.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Store::get                          │
//! │                                                              │
//! │   MetadataManager ──hit──▶ cached layer rootfs paths         │
//! │        │ miss                                                │
//! │        ▼                                                     │
//! │   in-flight table ──already pulling──▶ attach to broadcast   │
//! │        │ first caller                                        │
//! │        ▼                                                     │
//! │   Puller::pull (registry | local archive)                    │
//! │        │                                                     │
//! │        ├─ RegistryPuller: RegistryClient ─▶ TokenManager     │
//! │        │       manifests, blobs (401 dance, 307 redirect)    │
//! │        └─ LocalPuller: repositories + layer chain            │
//! │        ▼                                                     │
//! │   layers moved into <store>/layers/<id>/rootfs               │
//! │   MetadataManager::put, outcome broadcast to waiters         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod manifest;
mod metadata;
pub mod paths;
pub mod pull;
pub mod reference;
pub mod registry;
mod store;

pub use manifest::DockerImageManifest;
pub use metadata::{ImageLayer, MetadataManager};
pub use pull::{Extractor, LocalPuller, Puller, RegistryPuller, TarExtractor};
pub use reference::ImageName;
pub use registry::{RegistryClient, Token, TokenManager};
pub use store::Store;
