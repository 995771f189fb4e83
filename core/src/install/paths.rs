// Writer paths for the loader files

pub const PRIMARY_NAME: &str = "ldlinux.sys";
pub const SECONDARY_NAME: &str = "ldlinux.c32";

/// `name` at the root of the volume.
pub fn root_path(name: &str) -> String {
    format!("s:/{}", name)
}

/// The install directory, unless it is empty. `"/"` is kept: the loader
/// gets it in its directory field and the move becomes a same-place rename.
pub fn install_directory(directory: Option<&str>) -> Option<&str> {
    directory.filter(|dir| !dir.is_empty())
}

/// `name` inside `directory`: runs of `/` and `\` collapse to one `/`,
/// `'` and `!` are quoted for the writer.
pub fn target_path(directory: &str, name: &str) -> String {
    let mut path = String::from("s:/");
    let mut slash = true;

    for c in directory.chars() {
        match c {
            '/' | '\\' => {
                if !slash {
                    path.push('/');
                    slash = true;
                }
            }
            '\'' | '!' => {
                path.push_str("'\\");
                path.push(c);
                path.push('\'');
                slash = false;
            }
            _ => {
                path.push(c);
                slash = false;
            }
        }
    }
    if !slash {
        path.push('/');
    }
    path.push_str(name);
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path() {
        assert_eq!(root_path(PRIMARY_NAME), "s:/ldlinux.sys");
        assert_eq!(root_path(SECONDARY_NAME), "s:/ldlinux.c32");
    }

    #[test]
    fn test_target_path_collapses_separators() {
        assert_eq!(
            target_path("//boot\\\\syslinux", PRIMARY_NAME),
            "s:/boot/syslinux/ldlinux.sys"
        );
        assert_eq!(target_path("boot/", PRIMARY_NAME), "s:/boot/ldlinux.sys");
        assert_eq!(target_path("/boot", PRIMARY_NAME), "s:/boot/ldlinux.sys");
    }

    #[test]
    fn test_target_path_quotes_specials() {
        assert_eq!(
            target_path("/don't/hi!", SECONDARY_NAME),
            "s:/don'\\''t/hi'\\!'/ldlinux.c32"
        );
    }

    #[test]
    fn test_only_empty_directory_is_no_directory() {
        assert_eq!(install_directory(None), None);
        assert_eq!(install_directory(Some("")), None);
        assert_eq!(install_directory(Some("/")), Some("/"));
        assert_eq!(install_directory(Some("/boot")), Some("/boot"));
    }

    #[test]
    fn test_root_directory_targets_root() {
        assert_eq!(target_path("/", PRIMARY_NAME), root_path(PRIMARY_NAME));
        assert_eq!(target_path("//\\", SECONDARY_NAME), root_path(SECONDARY_NAME));
    }
}
