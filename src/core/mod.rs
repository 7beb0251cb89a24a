// ─── Launcher Core ───
// Acquisition, installation and launch engine for the modded 1.12.2 client.
//
// Architecture:
//   core/
//     manifest/   — remote file listing + validation
//     integrity/  — SHA-256 / SHA-1 file digests
//     downloader/ — streamed downloads with mirror fallback
//     reconcile/  — local tree vs manifest, content-root lease
//     archive/    — zip extraction (tree-preserving and flattened)
//     version/    — runtime version descriptor + platform rules
//     maven/      — coordinate parsing and repository paths
//     assets/     — asset index + content-addressed objects
//     loaders/    — Forge installation pipeline, library table, client archive
//     java/       — runtime discovery, version tiers, legacy runtime install
//     launch/     — classpath, arguments, natives, supervised spawn
//     auth/       — user session + token regeneration
//     update/     — launcher self-update
//     state/      — configuration + shared clients

pub mod archive;
pub mod assets;
pub mod auth;
pub mod downloader;
pub mod error;
pub mod http;
pub mod integrity;
pub mod java;
pub mod launch;
pub mod loaders;
pub mod logging;
pub mod manifest;
pub mod maven;
pub mod process;
pub mod progress;
pub mod reconcile;
pub mod state;
pub mod update;
pub mod version;
