use super::{CommandError, CommandResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get {
        resource: String,
        name: String,
        format: OutputFormat,
    },
    Set {
        resource: String,
        name: String,
        /// Raw `-v` argument, parsed as JSON by the executor
        value: String,
    },
    AttrList {
        resource: Option<String>,
    },
    Notifs {
        filter: Option<String>,
    },
    Help,
}

impl Command {
    pub fn parse(line: &str) -> CommandResult<Self> {
        let tokens = tokenize(line)?;
        let Some((verb, args)) = tokens.split_first() else {
            return Err(CommandError::Syntax("empty command".to_string()));
        };
        let args = Args::parse(args)?;

        match verb.as_str() {
            "get" => {
                let format = match (args.flag('j'), args.flag('t')) {
                    (true, true) => {
                        return Err(CommandError::Syntax(
                            "-j and -t are mutually exclusive".to_string(),
                        ))
                    }
                    (true, false) => OutputFormat::Json,
                    _ => OutputFormat::Text,
                };
                args.only(&['r', 'n', 'j', 't'])?;
                Ok(Command::Get {
                    resource: args.required('r')?,
                    name: args.required('n')?,
                    format,
                })
            }
            "set" => {
                args.only(&['r', 'n', 'v'])?;
                Ok(Command::Set {
                    resource: args.required('r')?,
                    name: args.required('n')?,
                    value: args.required('v')?,
                })
            }
            "attr-list" => {
                args.only(&['r'])?;
                Ok(Command::AttrList {
                    resource: args.optional('r'),
                })
            }
            "notifs" => {
                args.only(&['f'])?;
                Ok(Command::Notifs {
                    filter: args.optional('f'),
                })
            }
            "help" => Ok(Command::Help),
            other => Err(CommandError::Syntax(format!("unknown command '{}'", other))),
        }
    }
}

/// `-x value` options and `-x` flags, in command-line order.
struct Args {
    options: Vec<(char, Option<String>)>,
}

/// Options that never take a value.
const FLAGS: &[char] = &['j', 't'];

impl Args {
    fn parse(tokens: &[String]) -> CommandResult<Self> {
        let mut options = Vec::new();
        let mut iter = tokens.iter();
        while let Some(token) = iter.next() {
            let key = match token.strip_prefix('-') {
                Some(rest) if rest.chars().count() == 1 => rest.chars().next(),
                _ => None,
            };
            let Some(key) = key else {
                return Err(CommandError::Syntax(format!("unexpected argument '{}'", token)));
            };
            if FLAGS.contains(&key) {
                options.push((key, None));
                continue;
            }
            match iter.next() {
                Some(value) => options.push((key, Some(value.clone()))),
                None => return Err(CommandError::Syntax(format!("-{} needs a value", key))),
            }
        }
        Ok(Self { options })
    }

    fn flag(&self, key: char) -> bool {
        self.options.iter().any(|(k, _)| *k == key)
    }

    fn optional(&self, key: char) -> Option<String> {
        self.options
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| v.clone())
    }

    fn required(&self, key: char) -> CommandResult<String> {
        self.optional(key)
            .ok_or_else(|| CommandError::Syntax(format!("missing -{}", key)))
    }

    fn only(&self, allowed: &[char]) -> CommandResult<()> {
        match self.options.iter().find(|(k, _)| !allowed.contains(k)) {
            Some((k, _)) => Err(CommandError::Syntax(format!("unknown option -{}", k))),
            None => Ok(()),
        }
    }
}

/// Split on whitespace; single and double quotes group, `\` escapes inside
/// double quotes.
fn tokenize(line: &str) -> CommandResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => current.push(escaped),
                            None => return Err(unterminated()),
                        },
                        Some(other) => current.push(other),
                        None => return Err(unterminated()),
                    }
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(other) => current.push(other),
                        None => return Err(unterminated()),
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            other => {
                in_token = true;
                current.push(other);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn unterminated() -> CommandError {
    CommandError::Syntax("unterminated quote".to_string())
}
