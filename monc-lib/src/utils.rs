//! contains small utility functions that have nowhere else to go

/// returns the crate version
pub fn get_version() -> [u16; 3] {
    let version_str = env!("CARGO_PKG_VERSION");
    version_str
        .split('.')
        .map(|x| {
            x.parse::<u16>()
                .expect("invalid version string, can't parse elems as u16")
        })
        .collect::<Vec<_>>()
        .try_into()
        .expect("Invalid version string (wrong number of dots, expected two)")
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_version_matches_manifest() {
        let [major, minor, patch] = super::get_version();
        assert_eq!(
            format!("{}.{}.{}", major, minor, patch),
            env!("CARGO_PKG_VERSION")
        );
    }
}
