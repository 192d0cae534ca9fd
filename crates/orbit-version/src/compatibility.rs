use orbit_core::Version;
use orbit_core::config::VersionsConfig;

/// Decides whether an application compiled against one platform version may
/// run on another.
///
/// Two versions are compatible when they share a major and no configured
/// incompatibility boundary lies in `(older, newer]`.
#[derive(Debug, Clone, Default)]
pub struct VersionCompatibility {
    boundaries: Vec<Version>,
}

impl VersionCompatibility {
    pub fn new(boundaries: Vec<Version>) -> Self {
        Self { boundaries }
    }

    pub fn from_config(config: &VersionsConfig) -> Self {
        Self::new(config.incompatible.clone())
    }

    pub fn accept(&self, first: &Version, second: &Version) -> bool {
        if first.major() != second.major() {
            return false;
        }
        let (older, newer) = if first <= second {
            (first, second)
        } else {
            (second, first)
        };
        !self.boundaries.iter().any(|b| older < b && b <= newer)
    }

    pub fn refuse(&self, first: &Version, second: &Version) -> bool {
        !self.accept(first, second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn majors_must_match() {
        let compatibility = VersionCompatibility::default();
        assert!(compatibility.accept(&v("8.1"), &v("8.300")));
        assert!(compatibility.refuse(&v("7.9"), &v("8.0")));
    }

    #[test]
    fn boundaries_split_a_major() {
        let compatibility = VersionCompatibility::new(vec![v("8.200")]);
        assert!(compatibility.accept(&v("8.100"), &v("8.199")));
        assert!(compatibility.refuse(&v("8.199"), &v("8.200")));
        assert!(compatibility.refuse(&v("8.300"), &v("8.100")));
        assert!(compatibility.accept(&v("8.200"), &v("8.300")));
    }
}
