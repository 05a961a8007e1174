use crate::error::JobError;

#[derive(Debug, PartialEq, Eq)]
pub struct Cmd<'a> {
    pub name: &'a str,
    pub args: Vec<&'a str>,
    pub stdout: Option<&'a str>, // Target of `>`
    pub stdin: Option<&'a str>,  // Source of `<`
    pub background: bool,        // Trailing `&`
}

impl Cmd<'_> {
    /// Command name and arguments, as shown by `jobs`.
    pub fn display(&self) -> String {
        std::iter::once(self.name)
            .chain(self.args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Splits a line into a single command. Returns `None` for a blank line.
pub fn parse_cmd(line: &str) -> Result<Option<Cmd<'_>>, JobError> {
    let mut words: Vec<&str> = line.split_whitespace().collect();
    let mut background = false;
    if let Some(last) = words.last_mut() {
        if *last == "&" {
            words.pop();
            background = true;
        } else if let Some(rest) = last.strip_suffix('&') {
            *last = rest;
            background = true;
        }
    }

    let mut words = words.into_iter();
    let name = match words.next() {
        Some(name) if name.starts_with(['<', '>']) => {
            return Err(JobError::Syntax(format!("missing command before '{}'", name)))
        }
        Some(name) => name,
        None if background => return Err(JobError::Syntax("unexpected '&'".to_string())),
        None => return Ok(None),
    };

    let mut cmd = Cmd {
        name,
        args: Vec::new(),
        stdout: None,
        stdin: None,
        background,
    };
    while let Some(word) = words.next() {
        let (op, target) = match word {
            ">" | "<" => (word, words.next()),
            _ if word.len() > 1 && word.starts_with(['<', '>']) => (&word[..1], Some(&word[1..])),
            _ => {
                cmd.args.push(word);
                continue;
            }
        };
        let target = target.ok_or_else(|| JobError::Syntax(format!("expected a file after '{}'", op)))?;
        if op == ">" {
            cmd.stdout = Some(target);
        } else {
            cmd.stdin = Some(target);
        }
    }
    Ok(Some(cmd))
}
