//! Decodes a project directory name (as written under `projects/`) back
//! into a human-readable project label.
//!
//! Project directories are named by replacing every `/` in the absolute
//! working-directory path with `-` (so `/root/crate` becomes
//! `-root-crate`). Decoding strips the most specific known home-directory
//! prefix it can match, falling back to less specific ones, then — for
//! anything still long — keeps only the trailing path components so the
//! dashboard label stays readable.

use regex::Regex;

const MAX_LABEL_LEN: usize = 40;

/// Tried in order, most specific first; the first one that matches wins.
const PREFIX_PATTERNS: &[&str] = &[
    r"^-home-[^-]+-Documents-lab-[^-]+-",
    r"^-home-[^-]+-Documents-lab-",
    r"^-home-[^-]+-Documents-",
    r"^-home-[^-]+-",
    r"^-home",
    r"^-",
];

pub fn decode_project_name(dir_name: &str) -> String {
    let stripped = PREFIX_PATTERNS
        .iter()
        .find_map(|pattern| {
            let re = Regex::new(pattern).expect("static pattern is valid");
            re.find(dir_name).map(|m| dir_name[m.end()..].to_string())
        })
        .unwrap_or_else(|| dir_name.to_string());

    if stripped.is_empty() {
        return dir_name.to_string();
    }

    if stripped.len() > MAX_LABEL_LEN {
        let components: Vec<&str> = stripped.split('-').filter(|c| !c.is_empty()).collect();
        if components.len() > 3 {
            return components[components.len() - 3..].join("-");
        }
    }
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bare_dash_prefix() {
        assert_eq!(decode_project_name("-root-crate"), "root-crate");
    }

    #[test]
    fn strips_home_prefix() {
        assert_eq!(decode_project_name("-home-alice-projects-contextd"), "alice-projects-contextd");
    }

    #[test]
    fn strips_documents_prefix() {
        assert_eq!(
            decode_project_name("-home-alice-Documents-myproject"),
            "myproject"
        );
    }

    #[test]
    fn strips_documents_lab_project_prefix() {
        assert_eq!(
            decode_project_name("-home-alice-Documents-lab-repo-src-module"),
            "src-module"
        );
    }

    #[test]
    fn truncates_long_results_to_trailing_three_components() {
        let dir_name = "-home-alice-one-two-three-four-five-six-seven-eight-nine-ten";
        let decoded = decode_project_name(dir_name);
        assert!(decoded.len() <= MAX_LABEL_LEN);
        assert_eq!(decoded, "eight-nine-ten");
    }

    #[test]
    fn falls_back_to_raw_name_when_empty() {
        assert_eq!(decode_project_name("-"), "-");
    }
}
