//! Per-class transformation.
//!
//! Every class entry receives exactly one [`Action`]: it is encoded when it
//! lies under the target package and is not ignored, patched when it is a
//! class reader shim, and passed through otherwise.

use std::fmt;

use log::debug;

use crate::hook::EncodeHook;
use crate::patch::{self, patch_class};
use crate::policy::ArchivePolicy;
use crate::{EntryPath, Error, Result};

/// What happens to a class entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Replaced by the encode hook's output.
    Encrypt,
    /// Rewritten to call the decode hook.
    Patch,
    /// Shipped unchanged.
    PassThrough,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encrypt => write!(f, "encrypt"),
            Self::Patch => write!(f, "patch"),
            Self::PassThrough => write!(f, "pass-through"),
        }
    }
}

/// A transformed class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    /// Bytes to ship.
    pub data: Vec<u8>,
    /// The action applied.
    pub action: Action,
    /// Whether a decode hook call was injected (patched classes only).
    pub injected: bool,
}

/// Applies the per-class action.
///
/// # Example
///
/// ```
/// use jarcloak::{ArchivePolicy, EntryPath};
/// use jarcloak::transform::{Action, SelectiveTransformer};
///
/// let policy = ArchivePolicy::new("com.acme");
/// let hook = |data: &[u8]| -> std::io::Result<Vec<u8>> { Ok(data.iter().rev().copied().collect()) };
/// let transformer = SelectiveTransformer::new(&policy, &hook);
///
/// let path = EntryPath::new("com/acme/Service.class").unwrap();
/// let out = transformer.transform(&path, b"\xca\xfe".to_vec()).unwrap();
/// assert_eq!(out.action, Action::Encrypt);
/// assert_eq!(out.data, b"\xfe\xca");
/// ```
#[derive(Clone, Copy)]
pub struct SelectiveTransformer<'a> {
    policy: &'a ArchivePolicy,
    hook: &'a dyn EncodeHook,
}

impl fmt::Debug for SelectiveTransformer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectiveTransformer")
            .field("policy", self.policy)
            .finish_non_exhaustive()
    }
}

impl<'a> SelectiveTransformer<'a> {
    /// Creates a transformer.
    pub fn new(policy: &'a ArchivePolicy, hook: &'a dyn EncodeHook) -> Self {
        Self { policy, hook }
    }

    /// Decides the action for `path`.
    pub fn classify(&self, path: &EntryPath) -> Action {
        if !path.is_class() {
            Action::PassThrough
        } else if self.policy.is_target(path) && !self.policy.is_ignored(path) {
            Action::Encrypt
        } else if patch::is_shim_class(path) {
            Action::Patch
        } else {
            Action::PassThrough
        }
    }

    /// Applies the action for `path` to `data`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EncodeFailed`] if the encode hook fails and
    /// [`Error::PatchFailed`] if a shim cannot be parsed or rewritten.
    pub fn transform(&self, path: &EntryPath, data: Vec<u8>) -> Result<Transformed> {
        let action = self.classify(path);
        match action {
            Action::Encrypt => {
                let encoded = self.hook.encode(&data).map_err(|e| Error::EncodeFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
                debug!("encoded {path}: {} -> {} bytes", data.len(), encoded.len());
                Ok(Transformed {
                    data: encoded,
                    action,
                    injected: false,
                })
            }
            Action::Patch => {
                let result = patch_class(&data, self.policy.patch_spec()).map_err(|e| match e {
                    e @ Error::PatchFailed { .. } => e,
                    other => Error::PatchFailed {
                        path: path.to_string(),
                        reason: other.to_string(),
                    },
                })?;
                Ok(Transformed {
                    data: result.data,
                    action,
                    injected: result.injected,
                })
            }
            Action::PassThrough => Ok(Transformed {
                data,
                action,
                injected: false,
            }),
        }
    }
}
