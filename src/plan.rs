//! Channel diff planning
//!
//! Pure comparison of the local version state against a patch manifest,
//! yielding the minimal set of channels to update in the fixed channel
//! enumeration order.

use crate::manifest::{PatchManifest, CHANNEL_ORDER};
use crate::state::LocalVersionState;

/// Channels whose locally recorded version differs from the manifest
/// target. Order follows [`CHANNEL_ORDER`]; manifest channels outside the
/// enumeration are unknown and skipped.
pub fn diff_channels(local: &LocalVersionState, manifest: &PatchManifest) -> Vec<String> {
    CHANNEL_ORDER
        .iter()
        .filter(|name| manifest.entry(name).is_some())
        .filter(|name| local.channel_version(name) != manifest.version)
        .map(|name| name.to_string())
        .collect()
}
