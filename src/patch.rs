//! Decode hook injection into the class reader shim.
//!
//! Bytecode libraries bundled in an application (ASM, or Spring's
//! repackaged copy) parse class files through a `ClassReader` whose
//! constructor takes `(byte[] buffer, int offset, ...)`. [`patch_class`]
//! rewrites those constructors to start with
//!
//! ```text
//! aload_1
//! iload_2
//! invokestatic <owner>.maybeDecrypt([BI)[B
//! astore_1
//! ```
//!
//! so every buffer is passed through the decode hook before the reader
//! looks at it. The [`Strong`](PatchStrength::Strong) strength also
//! declares the hook as a native method on the patched class and clears the
//! buffer local before every return.

use std::fmt;

use log::{debug, info, warn};

use crate::classfile::opcodes::{ACONST_NULL, ALOAD_1, ASTORE_1, ILOAD_2, INVOKESTATIC};
use crate::classfile::rewrite::CodeRewriter;
use crate::classfile::{ClassFile, CodeAttribute, access};
use crate::{EntryPath, Error, Result};

/// Decode helper class used by the weak strength.
pub const DEFAULT_HELPER_CLASS: &str = "com/github/jsbxyyx/mjar/NativeDecryptHelper";

/// Name of the decode hook method.
pub const HOOK_NAME: &str = "maybeDecrypt";

/// Descriptor of the decode hook method: `byte[] (byte[], int)`.
pub const HOOK_DESCRIPTOR: &str = "([BI)[B";

/// Entry path suffixes of the class reader shims.
pub const SHIM_SUFFIXES: [&str; 2] = [
    "org/objectweb/asm/ClassReader.class",
    "org/springframework/asm/ClassReader.class",
];

const CONSTRUCTOR: &str = "<init>";
const WEAK_TARGET: &str = "([BIZ)V";
const STRONG_TARGET_PREFIX: &str = "([BI";

/// Returns `true` if `path` is a class reader shim.
pub fn is_shim_class(path: &EntryPath) -> bool {
    SHIM_SUFFIXES
        .iter()
        .any(|suffix| path.as_str().ends_with(suffix))
}

/// How much of the shim is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatchStrength {
    /// Only the `(byte[], int, boolean)` constructor gets the hook call. The
    /// hook lives in a separate helper class shipped in the archive.
    Weak,
    /// Every `(byte[], int...)` constructor gets the hook call and clears the
    /// buffer before returning. The hook is declared as a native method on
    /// the shim itself.
    #[default]
    Strong,
}

impl PatchStrength {
    fn targets(self, descriptor: &str) -> bool {
        match self {
            Self::Weak => descriptor == WEAK_TARGET,
            Self::Strong => descriptor.starts_with(STRONG_TARGET_PREFIX),
        }
    }
}

impl fmt::Display for PatchStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weak => write!(f, "weak"),
            Self::Strong => write!(f, "strong"),
        }
    }
}

/// Parameters of the shim rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSpec {
    /// Rewrite strength.
    pub strength: PatchStrength,
    /// Internal name of the class owning the hook under the weak strength.
    pub helper_class: String,
    /// Hook method name.
    pub hook_name: String,
    /// Hook method descriptor.
    pub hook_descriptor: String,
}

impl Default for PatchSpec {
    fn default() -> Self {
        Self {
            strength: PatchStrength::default(),
            helper_class: DEFAULT_HELPER_CLASS.to_string(),
            hook_name: HOOK_NAME.to_string(),
            hook_descriptor: HOOK_DESCRIPTOR.to_string(),
        }
    }
}

impl PatchSpec {
    /// Returns the entry path of the helper class (`com/acme/Helper.class`).
    pub fn helper_entry_path(&self) -> String {
        format!("{}.class", self.helper_class)
    }

    fn hook_owner<'a>(&'a self, patched_class: &'a str) -> &'a str {
        match self.strength {
            PatchStrength::Weak => &self.helper_class,
            PatchStrength::Strong => patched_class,
        }
    }
}

/// The outcome of [`patch_class`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    /// Class bytes to ship (the input bytes when nothing was injected).
    pub data: Vec<u8>,
    /// Whether a hook call was injected.
    pub injected: bool,
}

impl PatchResult {
    fn unchanged(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            injected: false,
        }
    }
}

/// Rewrites a class reader shim to call the decode hook.
///
/// A class without a matching constructor, or one that was already patched,
/// is returned unchanged with `injected == false`.
///
/// # Errors
///
/// Returns [`Error::InvalidClassFile`] if the class cannot be parsed and
/// [`Error::PatchFailed`] if a matching constructor cannot be rewritten.
pub fn patch_class(bytes: &[u8], spec: &PatchSpec) -> Result<PatchResult> {
    let mut class = ClassFile::parse(bytes)?;
    let class_name = class.this_class_name()?.to_string();

    if spec.strength == PatchStrength::Strong
        && class.declares_method(&spec.hook_name, &spec.hook_descriptor)?
    {
        warn!("{class_name} already declares {}, leaving it unchanged", spec.hook_name);
        return Ok(PatchResult::unchanged(bytes));
    }

    let mut targets = Vec::new();
    for (m, method) in class.methods.iter().enumerate() {
        if method.name(&class.constant_pool)? != CONSTRUCTOR {
            continue;
        }
        let descriptor = method.descriptor(&class.constant_pool)?;
        if !spec.strength.targets(descriptor) {
            continue;
        }
        match method.code_attribute(&class.constant_pool)? {
            Some(a) => targets.push((m, a, descriptor.to_string())),
            None => debug!("{class_name}.<init>{descriptor} has no body"),
        }
    }
    if targets.is_empty() {
        warn!(
            "{class_name} has no constructor matching the {} patch, passing it through",
            spec.strength
        );
        return Ok(PatchResult::unchanged(bytes));
    }

    let owner = spec.hook_owner(&class_name).to_string();
    let hook = class
        .constant_pool
        .add_methodref(&owner, &spec.hook_name, &spec.hook_descriptor)?;
    let [hi, lo] = hook.to_be_bytes();
    let prologue = vec![ALOAD_1, ILOAD_2, INVOKESTATIC, hi, lo, ASTORE_1];

    let mut rewriter = CodeRewriter::new(prologue.clone(), 2).min_locals(3);
    if spec.strength == PatchStrength::Strong {
        rewriter = rewriter.before_returns(vec![ACONST_NULL, ASTORE_1], 1);
    }

    for (m, a, descriptor) in &targets {
        let failed = |e: Error| Error::PatchFailed {
            path: format!("{class_name}.<init>{descriptor}"),
            reason: e.to_string(),
        };
        let mut code = CodeAttribute::parse(&class.methods[*m].attributes[*a].info).map_err(failed)?;
        if code.code.starts_with(&prologue) {
            warn!("{class_name}.<init>{descriptor} already calls the decode hook, leaving it unchanged");
            return Ok(PatchResult::unchanged(bytes));
        }
        rewriter
            .rewrite(&mut code, &class.constant_pool)
            .map_err(failed)?;
        class.methods[*m].attributes[*a].info = code.to_bytes().map_err(failed)?;
        info!("patched {class_name}.<init>{descriptor}");
    }

    if spec.strength == PatchStrength::Strong {
        class.add_bodiless_method(
            access::PUBLIC | access::STATIC | access::NATIVE,
            &spec.hook_name,
            &spec.hook_descriptor,
        )?;
    }

    Ok(PatchResult {
        data: class.to_bytes()?,
        injected: true,
    })
}
