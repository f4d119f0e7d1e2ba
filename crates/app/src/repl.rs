//! Line-oriented client surface.
//!
//! Each input line parses into one [`Command`]; dispatch runs it against
//! the store and workflow layer and prints the outcome. Parsing is a pure
//! function so the grammar is testable without a terminal.

use crate::context::AppContext;
use shared::model::ViewMode;
use shared::preview::build_preview_doc;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;
use workflows::RefactorKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Projects,
    Sessions,
    Search(String),
    New(String),
    Scaffold(String),
    Chat(String),
    Open(usize),
    Use(usize),
    File(String),
    Show,
    Edit(String),
    Say(String),
    Refactor(RefactorKind),
    Explain,
    Preview,
    View(ViewMode),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    // The three assistant actions double as command words.
    if let Some(kind) = RefactorKind::parse(word) {
        return Ok(Command::Refactor(kind));
    }

    match word {
        "projects" => Ok(Command::Projects),
        "sessions" => Ok(Command::Sessions),
        "search" => require(rest, "search <text>").map(Command::Search),
        "new" => Ok(Command::New(named(rest, "New Astra Project"))),
        "scaffold" => require(rest, "scaffold <prompt>").map(Command::Scaffold),
        "chat" => Ok(Command::Chat(named(rest, "New Discussion"))),
        "open" => parse_index(rest).map(Command::Open),
        "use" => parse_index(rest).map(Command::Use),
        "file" => require(rest, "file <name>").map(Command::File),
        "show" => Ok(Command::Show),
        "edit" => require(rest, "edit <content>").map(Command::Edit),
        "say" => require(rest, "say <message>").map(Command::Say),
        "explain" => Ok(Command::Explain),
        "preview" => Ok(Command::Preview),
        "view" => ViewMode::parse(rest)
            .map(Command::View)
            .ok_or_else(|| "usage: view <landing|dashboard|chat|ide>".to_string()),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        _ => Err(format!("unknown command: {word} (try \"help\")")),
    }
}

fn require(rest: &str, usage: &str) -> Result<String, String> {
    if rest.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(rest.to_string())
    }
}

fn named(rest: &str, fallback: &str) -> String {
    if rest.is_empty() {
        fallback.to_string()
    } else {
        rest.to_string()
    }
}

fn parse_index(rest: &str) -> Result<usize, String> {
    match rest.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err("expected a 1-based list index".to_string()),
    }
}

pub async fn run(ctx: &AppContext) -> anyhow::Result<()> {
    println!("Astra - AI software engineering workspace. Type \"help\" for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("astra> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => dispatch(ctx, command).await,
            Err(message) => println!("{message}"),
        }
    }
    Ok(())
}

async fn dispatch(ctx: &AppContext, command: Command) {
    match command {
        Command::Projects => {
            let store = ctx.store.lock();
            if store.projects().is_empty() {
                println!("No projects yet. Try \"new\" or \"scaffold <prompt>\".");
            }
            for (n, project) in store.projects().iter().enumerate() {
                println!(
                    "{}. {} ({} files, edited {})",
                    n + 1,
                    project.name,
                    project.files.len(),
                    project.last_modified.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Sessions => {
            let store = ctx.store.lock();
            if store.sessions().is_empty() {
                println!("No chat sessions yet. Try \"chat\".");
            }
            for (n, session) in store.sessions().iter().enumerate() {
                println!(
                    "{}. {} ({} messages)",
                    n + 1,
                    session.title,
                    session.messages.len()
                );
            }
        }
        Command::Search(query) => {
            let store = ctx.store.lock();
            let projects = store.find_projects(&query);
            let sessions = store.find_sessions(&query);
            if projects.is_empty() && sessions.is_empty() {
                println!("No matches.");
            }
            for project in projects {
                println!("project: {}", project.name);
            }
            for session in sessions {
                println!("session: {}", session.title);
            }
        }
        Command::New(name) => create_project(ctx, &name, None).await,
        Command::Scaffold(prompt) => create_project(ctx, "AI Project", Some(&prompt)).await,
        Command::Chat(title) => {
            let mut store = ctx.store.lock();
            let session = store.create_session(&title);
            store.set_active_session(Some(session.id));
            store.set_view_mode(ViewMode::Chat);
            println!("Started \"{}\".", session.title);
        }
        Command::Open(index) => {
            let mut store = ctx.store.lock();
            let target = store
                .projects()
                .get(index)
                .map(|p| (p.id, p.name.clone(), p.files.first().map(|f| f.id)));
            match target {
                Some((id, name, first_file)) => {
                    store.set_active_project(Some(id));
                    store.set_active_file(first_file);
                    store.set_view_mode(ViewMode::Ide);
                    println!("Opened \"{name}\".");
                }
                None => println!("No project at that position (see \"projects\")."),
            }
        }
        Command::Use(index) => {
            let mut store = ctx.store.lock();
            let target = store.sessions().get(index).map(|s| (s.id, s.title.clone()));
            match target {
                Some((id, title)) => {
                    store.set_active_session(Some(id));
                    store.set_view_mode(ViewMode::Chat);
                    println!("Resumed \"{title}\".");
                }
                None => println!("No session at that position (see \"sessions\")."),
            }
        }
        Command::File(name) => {
            let mut store = ctx.store.lock();
            let file_id = store
                .active_project()
                .and_then(|p| p.file_by_name(&name))
                .map(|f| f.id);
            match file_id {
                Some(id) => {
                    store.set_active_file(Some(id));
                    println!("Now editing {name}.");
                }
                None if store.active_project().is_none() => println!("Open a project first."),
                None => println!("No file named \"{name}\" in this project."),
            }
        }
        Command::Show => {
            let store = ctx.store.lock();
            match store.active_file() {
                Some(file) => {
                    println!("--- {} ({}) ---", file.name, file.language);
                    println!("{}", file.content);
                }
                None => match store.active_project() {
                    Some(_) => println!("This project has no files."),
                    None => println!("Open a project first."),
                },
            }
        }
        Command::Edit(content) => {
            let mut store = ctx.store.lock();
            let target = store
                .active_project()
                .map(|p| p.id)
                .zip(store.active_file().map(|f| f.id));
            match target {
                Some((project_id, file_id)) => {
                    match store.update_file_content(project_id, file_id, &content) {
                        Ok(()) => println!("Saved."),
                        Err(e) => println!("{e}"),
                    }
                }
                None => println!("Open a project first."),
            }
        }
        Command::Say(text) => {
            let session_id = ctx.store.lock().active_session().map(|s| s.id);
            match session_id {
                Some(session_id) => say(ctx, session_id, &text).await,
                None => println!("Start or select a session first (\"chat\" / \"use <n>\")."),
            }
        }
        Command::Refactor(kind) => match active_file_target(ctx) {
            Some((project_id, file_id)) => {
                println!("Astra is analyzing your code...");
                match ctx.workflows.refactor_file(project_id, file_id, kind).await {
                    Ok(feedback) => println!("{}", feedback.message),
                    Err(e) => println!("{e}"),
                }
            }
            None => println!("Open a project first."),
        },
        Command::Explain => match active_file_target(ctx) {
            Some((project_id, file_id)) => {
                println!("Astra is analyzing your code...");
                match ctx.workflows.explain_file(project_id, file_id).await {
                    Ok(text) => println!("{text}"),
                    Err(e) => println!("{e}"),
                }
            }
            None => println!("Open a project first."),
        },
        Command::Preview => {
            let store = ctx.store.lock();
            match store.active_project() {
                Some(project) => print!("{}", build_preview_doc(project)),
                None => println!("Open a project first."),
            }
        }
        Command::View(mode) => {
            ctx.store.lock().set_view_mode(mode);
            println!("View: {}", mode.as_str());
        }
        Command::Help => print_help(),
        // Quit never reaches dispatch; the loop handles it.
        Command::Quit => {}
    }
}

/// Shared setup for "new" and "scaffold". A fresh project becomes the
/// active one with its first file selected, matching what a user would
/// do next anyway.
async fn create_project(ctx: &AppContext, name: &str, prompt: Option<&str>) {
    if prompt.is_some() {
        println!("Astra is designing your project...");
    }
    match ctx.workflows.create_project(name, prompt).await {
        Ok(Some(project)) => {
            let first_file = project.files.first().map(|f| f.id);
            let mut store = ctx.store.lock();
            store.set_active_project(Some(project.id));
            store.set_active_file(first_file);
            store.set_view_mode(ViewMode::Ide);
            println!(
                "Created \"{}\" with {} files.",
                project.name,
                project.files.len()
            );
        }
        Ok(None) => println!("Scaffold failed; nothing was created."),
        Err(e) => println!("{e}"),
    }
}

async fn say(ctx: &AppContext, session_id: Uuid, text: &str) {
    let mut shown = String::new();
    let result = ctx
        .workflows
        .chat_turn(session_id, text, |text: &str| {
            // The stream reports cumulative text; print only what is new.
            match text.strip_prefix(shown.as_str()) {
                Some(delta) => print!("{delta}"),
                None => print!("\n{text}"),
            }
            let _ = std::io::stdout().flush();
            shown = text.to_string();
        })
        .await;
    if !shown.is_empty() {
        println!();
    }
    if let Err(e) = result {
        println!("{e}");
    }
}

fn active_file_target(ctx: &AppContext) -> Option<(Uuid, Uuid)> {
    let store = ctx.store.lock();
    let project_id = store.active_project()?.id;
    let file_id = store.active_file()?.id;
    Some((project_id, file_id))
}

fn print_help() {
    println!(
        r#"Commands:
  projects              list projects (newest first)
  sessions              list chat sessions (newest first)
  search <text>         find projects and sessions by name
  new [name]            create a blank starter project
  scaffold <prompt>     have the AI design a project from a prompt
  open <n>              open a project from the list
  file <name>           select a file in the open project
  show                  print the selected file
  edit <content>        replace the selected file's content
  optimize | comments | bugs
                        run an AI refactor on the selected file
  explain               ask the AI what the selected file does
  preview               print the project's assembled preview document
  chat [title]          start a chat session
  use <n>               resume a session from the list
  say <message>         send a message in the active session
  view <mode>           switch view (landing, dashboard, chat, ide)
  help                  show this text
  quit                  save and exit"#
    );
}
