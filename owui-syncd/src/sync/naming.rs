use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

pub const NAME_JOINER: &str = "__";

#[derive(Debug, Error)]
#[error("unknown naming policy: {0} (expected \"full-path\" or \"collision-aware\")")]
pub struct UnknownPolicy(String);

/// How a local path becomes the name the remote collection shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingPolicy {
    /// `foo/bar/baz.txt` -> `foo__bar__baz.txt`, unique by construction.
    #[default]
    FullPath,
    /// Plain basename unless another known path shares it, then
    /// `<parent>__<basename>`. Three or more colliding basenames whose
    /// parents share a name can still clash.
    CollisionAware,
}

impl NamingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamingPolicy::FullPath => "full-path",
            NamingPolicy::CollisionAware => "collision-aware",
        }
    }
}

impl FromStr for NamingPolicy {
    type Err = UnknownPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full-path" | "full_path" | "a" => Ok(NamingPolicy::FullPath),
            "collision-aware" | "collision_aware" | "b" => Ok(NamingPolicy::CollisionAware),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NameResolver {
    root: PathBuf,
    policy: NamingPolicy,
}

impl NameResolver {
    pub fn new(root: impl Into<PathBuf>, policy: NamingPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn policy(&self) -> NamingPolicy {
        self.policy
    }

    /// Display name for `path`, given every path already tracked. The
    /// candidate itself is ignored when it appears in `known`.
    pub fn resolve<'a, I>(&self, path: &Path, known: I) -> String
    where
        I: IntoIterator<Item = &'a Path>,
    {
        match self.policy {
            NamingPolicy::FullPath => self.full_path_name(path),
            NamingPolicy::CollisionAware => collision_aware_name(path, known),
        }
    }

    fn full_path_name(&self, path: &Path) -> String {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return basename(path);
        };
        let parts: Vec<String> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            return basename(path);
        }
        parts.join(NAME_JOINER)
    }
}

fn collision_aware_name<'a, I>(path: &Path, known: I) -> String
where
    I: IntoIterator<Item = &'a Path>,
{
    let name = basename(path);
    let collides = known
        .into_iter()
        .any(|other| other != path && basename(other) == name);
    if !collides {
        return name;
    }
    match path
        .parent()
        .and_then(Path::file_name)
        .map(|parent| parent.to_string_lossy())
    {
        Some(parent) => format!("{parent}{NAME_JOINER}{name}"),
        None => name,
    }
}

pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn full_path_encodes_every_directory() {
        let resolver = NameResolver::new("/root", NamingPolicy::FullPath);
        let none: Vec<PathBuf> = Vec::new();
        assert_eq!(
            resolver.resolve(Path::new("/root/foo/bar/baz.txt"), none.iter().map(PathBuf::as_path)),
            "foo__bar__baz.txt"
        );
        assert_eq!(
            resolver.resolve(Path::new("/root/top.md"), none.iter().map(PathBuf::as_path)),
            "top.md"
        );
    }

    #[test]
    fn full_path_keeps_same_basenames_apart() {
        let resolver = NameResolver::new("/root", NamingPolicy::FullPath);
        let known = paths(&["/root/a/x.txt"]);
        let a = resolver.resolve(Path::new("/root/a/x.txt"), known.iter().map(PathBuf::as_path));
        let b = resolver.resolve(Path::new("/root/b/x.txt"), known.iter().map(PathBuf::as_path));
        assert_ne!(a, b);
        assert_eq!(a, "a__x.txt");
        assert_eq!(b, "b__x.txt");
    }

    #[test]
    fn full_path_outside_root_falls_back_to_basename() {
        let resolver = NameResolver::new("/root", NamingPolicy::FullPath);
        assert_eq!(
            resolver.resolve(Path::new("/elsewhere/x.txt"), std::iter::empty()),
            "x.txt"
        );
    }

    #[test]
    fn collision_aware_uses_basename_without_collision() {
        let resolver = NameResolver::new("/root", NamingPolicy::CollisionAware);
        let known = paths(&["/root/p1/y.txt"]);
        assert_eq!(
            resolver.resolve(Path::new("/root/p2/x.txt"), known.iter().map(PathBuf::as_path)),
            "x.txt"
        );
    }

    #[test]
    fn collision_aware_prefixes_parent_on_collision() {
        let resolver = NameResolver::new("/root", NamingPolicy::CollisionAware);
        let known = paths(&["/root/p1/x.txt"]);
        assert_eq!(
            resolver.resolve(Path::new("/root/p2/x.txt"), known.iter().map(PathBuf::as_path)),
            "p2__x.txt"
        );
        // The candidate does not collide with itself.
        assert_eq!(
            resolver.resolve(Path::new("/root/p1/x.txt"), known.iter().map(PathBuf::as_path)),
            "x.txt"
        );
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("full-path".parse::<NamingPolicy>().unwrap(), NamingPolicy::FullPath);
        assert_eq!(
            " Collision-Aware ".parse::<NamingPolicy>().unwrap(),
            NamingPolicy::CollisionAware
        );
        assert!("random".parse::<NamingPolicy>().is_err());
        assert_eq!(NamingPolicy::default().as_str(), "full-path");
    }
}
