//! `rustscout chat`: interactive session.

use std::io::Write;

use rustscout_agent::Assistant;
use rustscout_config::AppConfig;
use rustscout_core::Mode;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::Outcome;

/// A parsed line of REPL input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Message(&'a str),
    Mode(Option<&'a str>),
    Search(&'a str),
    Scrape(&'a str),
    Reset,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse(line: &str) -> Input<'_> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return match line {
            "exit" | "quit" => Input::Quit,
            _ => Input::Message(line),
        };
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "mode" => Input::Mode((!rest.is_empty()).then_some(rest)),
        "search" => Input::Search(rest),
        "scrape" => Input::Scrape(rest),
        "reset" | "clear" => Input::Reset,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(name),
    }
}

fn print_help() {
    println!("  /mode [conversation|search|scrape]  Show or switch the input mode");
    println!("  /search <query>                     Answer from web search results");
    println!("  /scrape <url> [question]            Answer from one web page");
    println!("  /reset                              Clear the conversation history");
    println!("  /quit                               Leave");
    println!();
}

pub async fn run(assistant: &Assistant, config: &AppConfig) -> anyhow::Result<()> {
    println!();
    println!("  RustScout interactive mode");
    println!();
    for line in super::model_status(config) {
        println!("  {line}");
    }
    println!("  Status:   {} ready", assistant.session().generator().name());
    println!("  Mode:     {}", assistant.mode());
    println!();
    println!("  Type a message and press Enter. /help lists commands.");
    println!("  Ctrl+C stops a running answer; /quit leaves.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You [{}] > ", assistant.mode());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let events = match parse(&line) {
            Input::Message("") => continue,
            Input::Message(text) => assistant.submit(text).await,
            Input::Search(query) => assistant.search(query).await,
            Input::Scrape(rest) => {
                let (url, question) = rustscout_agent::assistant::split_url(rest);
                assistant.scrape(url, question).await
            }
            Input::Mode(None) => {
                println!("  Current mode: {}", assistant.mode());
                continue;
            }
            Input::Mode(Some(name)) => {
                match name.parse::<Mode>() {
                    Ok(mode) => match assistant.set_mode(mode) {
                        Ok(()) => println!("  Switched to {mode} mode"),
                        Err(e) => eprintln!("  [Error] {e}"),
                    },
                    Err(e) => eprintln!("  [Error] {e}"),
                }
                continue;
            }
            Input::Reset => {
                match assistant.reset() {
                    Ok(()) => println!("  Conversation cleared"),
                    Err(e) => eprintln!("  [Error] {e}"),
                }
                continue;
            }
            Input::Help => {
                print_help();
                continue;
            }
            Input::Unknown(name) => {
                eprintln!("  Unknown command /{name}, try /help");
                continue;
            }
            Input::Quit => break,
        };

        match super::render(events).await? {
            Outcome::Answered(result) => {
                println!();
                for line in result.cleaned_text.lines() {
                    println!("  Assistant > {line}");
                }
            }
            Outcome::Failed(message) => eprintln!("  [Error] {message}"),
            Outcome::Interrupted => eprintln!("  [Stopped]"),
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse("hello there"), Input::Message("hello there"));
        assert_eq!(parse("/search rust async "), Input::Search("rust async"));
        assert_eq!(
            parse("/scrape example.com who wrote it?"),
            Input::Scrape("example.com who wrote it?")
        );
        assert_eq!(parse("/mode"), Input::Mode(None));
        assert_eq!(parse("/mode search"), Input::Mode(Some("search")));
        assert_eq!(parse("/clear"), Input::Reset);
        assert_eq!(parse("exit"), Input::Quit);
        assert_eq!(parse("/frobnicate"), Input::Unknown("frobnicate"));
    }
}
