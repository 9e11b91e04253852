//! Shell command synthesis.
//!
//! Turns submitted source code into one `sh` line that writes the code to a
//! file inside the container and runs it with the language's interpreter:
//!
//! ```text
//! [touch <file>;]echo '<code>' > <file>;<interpreter> <file>;
//! ```
//!
//! A first line of the form `file-<name>` (the directive line) selects the
//! target file instead of the default one and is stripped from the code. The
//! directive may sit in a comment (`# file-main.py`, `// file-app.js`) so the
//! source stays valid on its own.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

use replbox_core::LanguageProfile;

static SINGLE_QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'(.*?)'").unwrap());

/// `file-<name>`, optionally behind a line comment marker. The name may not
/// start with `-`, so it is never read as an option.
static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:#|//|--|;)\s*)?file-([A-Za-z0-9_.][A-Za-z0-9_.\-]*)$").unwrap()
});

/// The pieces of one synthesized execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// File the code is written to and run from, extension included.
    pub target_filename: String,
    /// `touch <file>;`, present only when a directive named the file.
    pub prepare_command: Option<String>,
    /// `echo <code> > <file>;`
    pub write_command: String,
    /// `<interpreter> <file>;`
    pub run_command: String,
}

impl CommandSpec {
    /// The complete shell line.
    pub fn to_shell(&self) -> String {
        let mut line = String::with_capacity(
            self.write_command.len() + self.run_command.len() + 32,
        );
        if let Some(prepare) = &self.prepare_command {
            line.push_str(prepare);
        }
        line.push_str(&self.write_command);
        line.push_str(&self.run_command);
        line
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_shell())
    }
}

/// Build the command that runs `code` for `profile`.
///
/// `default_stem` names the target file (before the extension) when the code
/// carries no directive line.
pub fn synthesize(code: &str, profile: &LanguageProfile, default_stem: &str) -> CommandSpec {
    let code = normalize_quotes(code.trim());

    let (body, directive) = split_directive(&code);

    let target_filename = match directive {
        Some(name) if name.ends_with(&format!(".{}", profile.extension)) => name.to_string(),
        Some(name) => profile.file_name(name),
        None => profile.file_name(default_stem),
    };
    let file = shell_quote(&target_filename);

    CommandSpec {
        prepare_command: directive.map(|_| format!("touch {};", file)),
        write_command: format!("echo {} > {};", shell_quote(body), file),
        run_command: format!("{} {};", profile.interpreter, file),
        target_filename,
    }
}

/// Rewrite `'...'` spans (within a line) as `"..."`.
pub fn normalize_quotes(code: &str) -> Cow<'_, str> {
    SINGLE_QUOTED.replace_all(code, "\"$1\"")
}

/// Split off a leading `file-<name>` line. Returns the remaining code and the
/// name, or the untouched code when the first line is not a directive.
fn split_directive(code: &str) -> (&str, Option<&str>) {
    let (first, rest) = match code.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (code, ""),
    };
    match DIRECTIVE.captures(first.trim()) {
        Some(caps) => {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            (rest, Some(name))
        }
        None => (code, None),
    }
}

/// Quote one word for POSIX `sh`.
///
/// Words made only of `[A-Za-z0-9_./=:@%+,-]` are returned unchanged. Every
/// other word, the empty word included, is wrapped in single quotes with each
/// embedded `'` written as `'\''`. The shell reads the result back as exactly
/// `word`, whatever it contains.
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    let is_safe = |c: char| c.is_ascii_alphanumeric() || "_./=:@%+,-".contains(c);
    if !word.is_empty() && word.chars().all(is_safe) {
        return Cow::Borrowed(word);
    }

    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for c in word.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python() -> LanguageProfile {
        LanguageProfile::new("python:3", "py", "python")
    }

    fn javascript() -> LanguageProfile {
        LanguageProfile::new("node:18-alpine", "js", "node")
    }

    #[test]
    fn test_single_quotes_become_double_quotes() {
        let cmd = synthesize("print('hi')", &python(), "file");
        assert_eq!(cmd.target_filename, "file.py");
        assert_eq!(cmd.prepare_command, None);
        assert_eq!(cmd.write_command, r#"echo 'print("hi")' > file.py;"#);
        assert_eq!(cmd.run_command, "python file.py;");
        assert_eq!(cmd.to_shell(), r#"echo 'print("hi")' > file.py;python file.py;"#);
    }

    #[test]
    fn test_directive_selects_file_and_is_stripped() {
        let cmd = synthesize("file-main.py\nprint(1)", &python(), "file");
        assert_eq!(cmd.target_filename, "main.py");
        assert_eq!(
            cmd.to_shell(),
            "touch main.py;echo 'print(1)' > main.py;python main.py;"
        );
        assert!(!cmd.write_command.contains("file-main"));
    }

    #[test]
    fn test_directive_without_extension_gets_one() {
        let cmd = synthesize("file-app\nconsole.log(1)", &javascript(), "file");
        assert_eq!(cmd.target_filename, "app.js");
        assert_eq!(cmd.prepare_command.as_deref(), Some("touch app.js;"));
        assert_eq!(cmd.run_command, "node app.js;");
    }

    #[test]
    fn test_directive_only_on_first_line() {
        let cmd = synthesize("print(1)\nfile-main.py", &python(), "file");
        assert_eq!(cmd.target_filename, "file.py");
        assert!(cmd.write_command.contains("file-main.py"));
    }

    #[test]
    fn test_commented_directive() {
        let cmd = synthesize("# file-main.py\nprint(1)", &python(), "file");
        assert_eq!(cmd.target_filename, "main.py");
        assert_eq!(cmd.to_shell(), "touch main.py;echo 'print(1)' > main.py;python main.py;");

        let cmd = synthesize("//file-app\nconsole.log(1)", &javascript(), "file");
        assert_eq!(cmd.target_filename, "app.js");

        let cmd = synthesize("# main.py\nprint(1)", &python(), "file");
        assert_eq!(cmd.target_filename, "file.py");
    }

    #[test]
    fn test_directive_name_cannot_look_like_an_option() {
        let cmd = synthesize("file--rf\nprint(1)", &python(), "file");
        assert_eq!(cmd.target_filename, "file.py");
        assert_eq!(cmd.prepare_command, None);
        assert!(!cmd.to_shell().contains(" -rf"));

        let cmd = synthesize("file-a-b\nprint(1)", &python(), "file");
        assert_eq!(cmd.target_filename, "a-b.py");
    }

    #[test]
    fn test_directive_with_path_is_not_a_directive() {
        let cmd = synthesize("file-../etc/x\nprint(1)", &python(), "file");
        assert_eq!(cmd.target_filename, "file.py");
        assert_eq!(cmd.prepare_command, None);
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        let cmd = synthesize("\n\n   print(2)  \n\t", &python(), "file");
        assert_eq!(cmd.write_command, "echo 'print(2)' > file.py;");
    }

    #[test]
    fn test_multiline_code_is_kept_intact() {
        let code = "for i in range(2):\n    print(i)";
        let cmd = synthesize(code, &python(), "file");
        assert_eq!(
            cmd.write_command,
            "echo 'for i in range(2):\n    print(i)' > file.py;"
        );
    }

    #[test]
    fn test_stray_single_quote_cannot_break_out() {
        // An apostrophe with no closing partner survives normalization.
        let cmd = synthesize("print(\"it's\")", &python(), "file");
        assert_eq!(
            cmd.write_command,
            r#"echo 'print("it'\''s")' > file.py;"#
        );
    }

    #[test]
    fn test_injection_stays_inside_quotes() {
        let cmd = synthesize("x\n'; rm -rf / #", &python(), "file");
        // The only unquoted `;` separators are the ones we emit.
        assert!(cmd.write_command.starts_with("echo '"));
        assert!(cmd.write_command.ends_with("' > file.py;"));
    }

    #[test]
    fn test_default_stem_is_configurable() {
        let cmd = synthesize("1", &python(), "scratch");
        assert_eq!(cmd.target_filename, "scratch.py");
    }

    #[test]
    fn test_shell_quote_contract() {
        assert_eq!(shell_quote("main.py"), "main.py");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$(whoami)"), "'$(whoami)'");
        assert!(matches!(shell_quote("plain-word_1"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_quotes_is_line_local() {
        assert_eq!(normalize_quotes("a = 'x'\nb = 'y'"), "a = \"x\"\nb = \"y\"");
        assert_eq!(normalize_quotes("don't\nstop"), "don't\nstop");
    }
}
