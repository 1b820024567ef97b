//! Locating and qualifying the image reference inside a container command line.

use tracing::debug;

/// Options whose value is the following argument. An option missing from this
/// table is assumed to be a bare flag or to use the `--opt=value` form.
pub const VALUE_OPTIONS: &[&str] = &[
    "--mount",
    "-v",
    "--volume",
    "-e",
    "--env",
    "-p",
    "--publish",
    "--name",
];

/// Fragments that only occur in mount specifications
const MOUNT_FRAGMENTS: &[&str] = &["type=bind", "src="];

/// Subcommand after which the image reference is searched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAnchor {
    Pull,
    Run,
}

impl ImageAnchor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageAnchor::Pull => "pull",
            ImageAnchor::Run => "run",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "pull" => Some(ImageAnchor::Pull),
            "run" => Some(ImageAnchor::Run),
            _ => None,
        }
    }
}

/// An image argument found in a command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub anchor: ImageAnchor,
    /// Position of the image in the argument list
    pub index: usize,
    pub original: String,
    pub normalized: String,
}

impl ResolvedImage {
    pub fn was_qualified(&self) -> bool {
        self.original == self.normalized
    }
}

pub fn takes_value(option: &str) -> bool {
    VALUE_OPTIONS.contains(&option)
}

/// The first `pull` or `run` token decides the anchor.
pub fn anchor_of(args: &[String]) -> Option<ImageAnchor> {
    args.iter().find_map(|arg| ImageAnchor::from_token(arg))
}

/// Index of the image reference following `anchor`, skipping options and
/// the values of options listed in [`VALUE_OPTIONS`].
pub fn locate_image(args: &[String], anchor: ImageAnchor) -> Option<usize> {
    let start = args.iter().position(|arg| arg == anchor.as_str())? + 1;

    let mut skip_next = false;
    for (index, arg) in args.iter().enumerate().skip(start) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with('-') {
            skip_next = takes_value(arg);
            continue;
        }
        return Some(index);
    }
    None
}

pub fn is_mount_fragment(candidate: &str) -> bool {
    MOUNT_FRAGMENTS
        .iter()
        .any(|fragment| candidate.contains(fragment))
}

/// An image is unqualified when it has no `/`, or when it has neither a
/// domain-like `.`, nor a `:`, and fewer than three path segments.
pub fn is_qualified(image: &str) -> bool {
    if !image.contains('/') {
        return false;
    }
    image.contains('.') || image.contains(':') || image.split('/').count() >= 3
}

pub fn normalize_image(image: &str, default_registry: &str) -> String {
    if is_qualified(image) {
        image.to_string()
    } else {
        format!("{default_registry}/{image}")
    }
}

/// Find and normalize the image of a `pull`/`run` command line.
///
/// Returns `None` when there is no anchor, no image after it, or when the
/// candidate is a mount specification rather than an image.
pub fn resolve_image(args: &[String], default_registry: &str) -> Option<ResolvedImage> {
    let anchor = anchor_of(args)?;
    let Some(index) = locate_image(args, anchor) else {
        debug!(anchor = anchor.as_str(), "No image argument found");
        return None;
    };

    let original = &args[index];
    if is_mount_fragment(original) {
        debug!(candidate = %original, "Skipping mount option mistaken for an image");
        return None;
    }

    Some(ResolvedImage {
        anchor,
        index,
        original: original.clone(),
        normalized: normalize_image(original, default_registry),
    })
}
