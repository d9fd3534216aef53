//! Interactive REPL.
//!
//! Lines are sent as Gremlin scripts; lines starting with `:` are REPL
//! commands.

use crate::commands::{format_frames, format_json};
use colored::Colorize;
use gremlink_client::{Client, ClientError};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

const HELP_TEXT: &str = r#"
Enter a Gremlin script to run it, e.g. g.V().limit(5)

Available commands:
  :help                  Show this help
  :count <script>        Run a counting script
  :vertices <script>     Run a script and decode vertices
  :edges <script>        Run a script and decode edges
  :raw                   Toggle GraphSON type wrappers in output
  :status                Show connection state
  :reconnect             Reconnect after the connection dropped
  :quit, :exit           Exit the REPL
"#;

enum Action {
    Print(String),
    Exit,
}

pub async fn run(
    client: Client,
    address: &str,
    mut raw: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "gremlink CLI".bold().cyan());
    println!("{} {}", "Connected to".green(), address);

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".gremlink_history"))
        .unwrap_or_else(|_| ".gremlink_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type ':help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "gremlin>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_line(&client, line, &mut raw).await {
                    Ok(Action::Print(output)) => println!("{}\n", output),
                    Ok(Action::Exit) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    let _ = client.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute_repl_line(
    client: &Client,
    line: &str,
    raw: &mut bool,
) -> Result<Action, Box<dyn std::error::Error>> {
    let Some(command) = line.strip_prefix(':') else {
        let frames = client.execute(line).await.map_err(hint)?;
        return Ok(Action::Print(format_frames(&frames, *raw)?));
    };

    let (cmd, rest) = command
        .split_once(char::is_whitespace)
        .map(|(c, r)| (c, r.trim()))
        .unwrap_or((command, ""));

    match cmd.to_lowercase().as_str() {
        "help" | "h" | "?" => Ok(Action::Print(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(Action::Exit),

        "count" | "c" => {
            if rest.is_empty() {
                return Ok(Action::Print("Usage: :count <script>".to_string()));
            }
            let count = client.get_count(&rest.to_string()).await.map_err(hint)?;
            Ok(Action::Print(count.to_string()))
        }

        "vertices" | "v" => {
            if rest.is_empty() {
                return Ok(Action::Print("Usage: :vertices <script>".to_string()));
            }
            let vertices = client.get_vertices(&rest.to_string()).await.map_err(hint)?;
            Ok(Action::Print(format_json(&serde_json::to_value(&vertices)?)))
        }

        "edges" | "e" => {
            if rest.is_empty() {
                return Ok(Action::Print("Usage: :edges <script>".to_string()));
            }
            let edges = client.get_edges(&rest.to_string()).await.map_err(hint)?;
            Ok(Action::Print(format_json(&serde_json::to_value(&edges)?)))
        }

        "raw" => {
            *raw = !*raw;
            Ok(Action::Print(format!(
                "Raw output {}",
                if *raw { "on".green() } else { "off".yellow() }
            )))
        }

        "status" => Ok(Action::Print(format!(
            "{} ({:?})",
            client.address().cyan(),
            client.state()
        ))),

        "reconnect" => {
            client.reconnect().await?;
            Ok(Action::Print(format!("{:?}", client.state())))
        }

        _ => Ok(Action::Print(format!(
            "Unknown command: :{}. Type ':help' for help.",
            cmd
        ))),
    }
}

/// Points the user at `:reconnect` when the connection is gone.
fn hint(err: ClientError) -> Box<dyn std::error::Error> {
    match err {
        ClientError::Disposed | ClientError::ConnectionClosed => {
            format!("{} (try :reconnect)", err).into()
        }
        other => other.into(),
    }
}
