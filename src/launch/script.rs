// src/launch/script.rs

//! Launch command templates and the generated script skeleton

use crate::fsutil::shell_quote;
use crate::registry::LaunchProfile;
use std::fmt::Write as _;
use std::path::Path;

/// Used when a profile has neither an override nor a default template
pub const DEFAULT_TEMPLATE: &str = "{exe} {content}";

/// Values substituted into a command template
#[derive(Debug, Clone, Copy)]
pub struct TemplateValues<'a> {
    /// Emulator invocation, already shell-quoted
    pub exe: &'a str,
    pub content: Option<&'a Path>,
    pub config_dir: &'a Path,
    pub firmware_dir: &'a Path,
    pub content_id: &'a str,
}

/// Substitute the known placeholders; anything else in braces is left alone
pub fn render_command(template: &str, values: &TemplateValues<'_>) -> String {
    let content = values
        .content
        .map(|p| shell_quote(&p.to_string_lossy()))
        .unwrap_or_default();
    let rendered = template
        .replace("{exe}", values.exe)
        .replace("{content}", &content)
        .replace("{config_dir}", &shell_quote(&values.config_dir.to_string_lossy()))
        .replace("{firmware_dir}", &shell_quote(&values.firmware_dir.to_string_lossy()))
        .replace("{content_id}", &shell_quote(values.content_id));
    rendered.trim().to_string()
}

/// Quote each word of a command and join them
pub fn quote_command(words: &[String]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full POSIX shell script for one installed entry
pub fn script_text(
    profile: &LaunchProfile,
    content_id: &str,
    title: &str,
    working_dir: &Path,
    command: &str,
) -> String {
    let mut script = String::with_capacity(256 + command.len());
    let _ = writeln!(script, "#!/bin/sh");
    let label: String = content_id.chars().filter(|c| !c.is_control()).collect();
    let _ = writeln!(script, "# Launcher for {label}, generated by gamestage");
    let _ = writeln!(
        script,
        "cd {} || exit 1",
        shell_quote(&working_dir.to_string_lossy())
    );
    for (key, value) in &profile.env {
        let _ = writeln!(script, "export {key}={}", shell_quote(value));
    }
    let _ = writeln!(script, "echo {}", shell_quote(&format!("Starting {title}")));
    let _ = writeln!(script, "{command}");
    let _ = writeln!(script, "status=$?");
    for line in &profile.post_launch {
        let _ = writeln!(script, "{line}");
    }
    let _ = writeln!(
        script,
        "echo {}\" $status\"",
        shell_quote(&format!("{title} exited with status"))
    );
    let _ = writeln!(script, "exit $status");
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn values<'a>(content: Option<&'a Path>) -> TemplateValues<'a> {
        TemplateValues {
            exe: "'/opt/emu/duckstation'",
            content,
            config_dir: Path::new("/cfg/duckstation"),
            firmware_dir: Path::new("/fw/ps1"),
            content_id: "ps1_demo",
        }
    }

    #[test]
    fn test_render_placeholders() {
        let content = PathBuf::from("/games/ps1_demo/Demo Disc.cue");
        let rendered = render_command(
            "{exe} -fullscreen -bios {firmware_dir} -- {content} # {content_id} {unknown}",
            &values(Some(&content)),
        );
        assert_eq!(
            rendered,
            "'/opt/emu/duckstation' -fullscreen -bios '/fw/ps1' -- '/games/ps1_demo/Demo Disc.cue' # 'ps1_demo' {unknown}"
        );
    }

    #[test]
    fn test_default_template_without_content() {
        assert_eq!(
            render_command(DEFAULT_TEMPLATE, &values(None)),
            "'/opt/emu/duckstation'"
        );
    }

    #[test]
    fn test_script_skeleton() {
        let profile = LaunchProfile {
            emulator_id: "duckstation".to_string(),
            env: BTreeMap::from([("QT_QPA_PLATFORM".to_string(), "xcb".to_string())]),
            post_launch: vec!["sync".to_string()],
            ..LaunchProfile::default()
        };
        let script = script_text(
            &profile,
            "ps1_demo",
            "Demo",
            Path::new("/games/ps1_demo"),
            "'/opt/emu/duckstation' '/games/ps1_demo/demo.cue'",
        );
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "#!/bin/sh");
        assert_eq!(lines[2], "cd '/games/ps1_demo' || exit 1");
        assert_eq!(lines[3], "export QT_QPA_PLATFORM='xcb'");
        assert_eq!(lines[4], "echo 'Starting Demo'");
        assert_eq!(lines[5], "'/opt/emu/duckstation' '/games/ps1_demo/demo.cue'");
        assert_eq!(lines[7], "sync");
        assert_eq!(lines.last(), Some(&"exit $status"));
    }

    #[test]
    fn test_quote_command() {
        let words = vec!["flatpak".to_string(), "run".to_string(), "org.duckstation.DuckStation".to_string()];
        assert_eq!(quote_command(&words), "'flatpak' 'run' 'org.duckstation.DuckStation'");
    }

    #[test]
    fn test_content_id_is_quoted() {
        let mut values = values(None);
        values.content_id = "Demo Game (USA) $HOME; rm -rf x";
        assert_eq!(
            render_command("{exe} --id {content_id}", &values),
            "'/opt/emu/duckstation' --id 'Demo Game (USA) $HOME; rm -rf x'"
        );
    }

    #[test]
    fn test_header_drops_control_characters() {
        let script = script_text(
            &LaunchProfile::default(),
            "demo\ntouch injected",
            "Demo",
            Path::new("/games/demo"),
            "'/bin/true'",
        );
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[1], "# Launcher for demotouch injected, generated by gamestage");
        assert!(!lines.iter().any(|line| line.starts_with("touch")));
        assert_eq!(lines[2], "cd '/games/demo' || exit 1");
    }
}
