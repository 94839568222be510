use crate::api::ApiClient;
use crate::feedback::FeedbackKind;
use crate::manager::ChatManager;
use crate::message::{Message, Role};
use crate::notify::{NotificationPoller, PollerHandle};
use crate::review::ReviewConsole;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::info;

/// Line-oriented interface over the core. Presentation glue only: every
/// state transition lives in the manager, poller, and console it drives.
pub struct CliInterface {
    manager: ChatManager,
    api: Arc<ApiClient>,
    poller: Arc<NotificationPoller>,
    handle: Option<PollerHandle>,
    feed_rx: watch::Receiver<crate::api::NotificationFeed>,
    poll_every: Duration,
    console: Option<ReviewConsole>,
    /// Correction id currently in the local edit buffer, if any. While set,
    /// the next input line is the replacement text (or /cancel).
    editing: Option<String>,
}

impl CliInterface {
    pub fn new(
        manager: ChatManager,
        api: Arc<ApiClient>,
        console: Option<ReviewConsole>,
        poll_every: Duration,
    ) -> Self {
        let poller = NotificationPoller::new(api.clone(), manager.session_id());
        let feed_rx = poller.subscribe();
        let handle = poller.spawn(poll_every);
        Self {
            manager,
            api,
            poller,
            handle: Some(handle),
            feed_rx,
            poll_every,
            console,
            editing: None,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        println!("Pharos - type a question, or /help for commands.\n");
        for (index, message) in self.manager.log().iter().enumerate() {
            print_message(index, message);
        }

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            self.print_unread_banner();

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim().to_string();

            // An empty line is meaningful inside the edit buffer (keep the
            // draft as is), so the editing state is checked first.
            if self.editing.is_some() {
                self.finish_edit(&line).await;
                continue;
            }
            if line.is_empty() {
                continue;
            }
            if line == "/quit" {
                break;
            }
            self.dispatch(&line).await;
        }

        if let Some(handle) = self.handle.take() {
            handle.stop().await;
        }
        info!("Interface loop finished");
        Ok(())
    }

    fn print_unread_banner(&mut self) {
        if self.feed_rx.has_changed().unwrap_or(false) {
            let unread = self.feed_rx.borrow_and_update().unread_count;
            if unread > 0 {
                println!("  ({} unread - /notifications to view)", unread);
            }
        }
    }

    async fn dispatch(&mut self, line: &str) {
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "/help" => print_help(self.console.is_some()),
            "/new" => self.new_chat().await,
            "/flag" => self.flag(rest).await,
            "/up" => self.rate(rest, FeedbackKind::ThumbsUp).await,
            "/down" => self.rate(rest, FeedbackKind::ThumbsDown).await,
            "/notifications" => self.show_notifications().await,
            "/read" => self.mark_read(rest).await,
            "/readall" => {
                if let Err(e) = self.poller.mark_all_read().await {
                    println!("Could not mark notifications read: {}", e);
                }
            }
            "/view" => self.view_correction(rest).await,
            "/pending" => self.show_pending().await,
            "/approve" => self.review(rest, ReviewCommand::Approve).await,
            "/reject" => self.review(rest, ReviewCommand::Reject).await,
            "/edit" => self.review(rest, ReviewCommand::Edit).await,
            _ if command.starts_with('/') => {
                println!("Unknown command {} - /help for the list.", command);
            }
            _ => self.ask(line).await,
        }
    }

    async fn ask(&mut self, text: &str) {
        let reply = self.manager.ask(text).await;
        print_message(self.manager.log().len() - 1, &reply);
        for question in self.manager.suggested_questions() {
            println!("    you could also ask: {}", question);
        }
    }

    async fn new_chat(&mut self) {
        match self.manager.new_chat().await {
            Ok(()) => {
                // The poller is bound to a session; re-target it.
                if let Some(handle) = self.handle.take() {
                    handle.stop().await;
                }
                self.poller = NotificationPoller::new(self.api.clone(), self.manager.session_id());
                self.feed_rx = self.poller.subscribe();
                self.handle = Some(self.poller.spawn(self.poll_every));

                println!("Started a new chat.");
                print_message(0, &self.manager.log()[0]);
            }
            Err(e) => println!("Could not start a new chat: {:#}", e),
        }
    }

    async fn flag(&mut self, rest: &str) {
        let (index, reason) = match rest.split_once(' ') {
            Some((index, reason)) => (index, reason),
            None => (rest, ""),
        };
        let Ok(index) = index.parse::<usize>() else {
            println!("Usage: /flag <message number> <reason>");
            return;
        };
        match self.manager.flag(index, reason).await {
            Ok(receipt) => println!(
                "Thank you! A reviewer will look at this response (correction {}). \
                 You'll be notified when it's reviewed.",
                receipt.correction_id
            ),
            Err(e) => println!("Could not submit flag: {}", e),
        }
    }

    async fn rate(&mut self, rest: &str, kind: FeedbackKind) {
        let Ok(index) = rest.parse::<usize>() else {
            println!("Usage: /up <message number> (or /down)");
            return;
        };
        match self.manager.rate(index, kind).await {
            Ok(()) => println!("Feedback recorded ({}).", kind),
            Err(e) => println!("Could not record feedback: {}", e),
        }
    }

    async fn show_notifications(&mut self) {
        self.poller.poll_once().await;
        let feed = self.poller.feed();
        if feed.notifications.is_empty() {
            println!("No notifications yet. You'll be notified when a reviewer resolves your flags.");
            return;
        }
        println!("{} notification(s), {} unread:", feed.notifications.len(), feed.unread_count);
        for n in &feed.notifications {
            let marker = if n.is_read { " " } else { "*" };
            println!("  {} [{}] {} - {} ({})", marker, n.id, n.title, n.message, n.created_at);
            if let Some(correction_id) = n.correction_id {
                println!("      /view {} for the reviewer's response", correction_id);
            }
        }
    }

    async fn mark_read(&mut self, rest: &str) {
        let Ok(id) = rest.parse::<i64>() else {
            println!("Usage: /read <notification id>");
            return;
        };
        if let Err(e) = self.poller.mark_read(id).await {
            println!("Could not mark notification read: {}", e);
        }
    }

    async fn view_correction(&mut self, rest: &str) {
        let Ok(id) = rest.parse::<i64>() else {
            println!("Usage: /view <correction id>");
            return;
        };
        match self.manager.correction_details(id).await {
            Ok(details) => {
                println!("Your question: {}", details.student_query);
                println!("Original answer: {}", details.original_response);
                match (&details.corrected_response, details.status) {
                    (Some(corrected), _) => println!("Reviewer's correction: {}", corrected),
                    (None, crate::api::CorrectionStatus::Approved) => {
                        println!("A reviewer confirmed the original answer was correct.")
                    }
                    (None, crate::api::CorrectionStatus::Rejected) => {
                        println!("A reviewer looked at your flag and kept the original answer.")
                    }
                    (None, crate::api::CorrectionStatus::Pending) => {
                        println!("Still awaiting review.")
                    }
                }
                if let Some(at) = details.reviewed_at {
                    match details.reviewed_by {
                        Some(by) => println!("Reviewed by {} on {}", by, at),
                        None => println!("Reviewed on {}", at),
                    }
                }
            }
            Err(e) => println!("Failed to load correction details, please try again: {}", e),
        }
    }

    // --- Reviewer side ---

    fn console(&mut self) -> Option<&mut ReviewConsole> {
        if self.console.is_none() {
            println!("Review console disabled - set PHAROS_REVIEWER_TOKEN and restart.");
        }
        self.console.as_mut()
    }

    async fn show_pending(&mut self) {
        let Some(console) = self.console() else { return };
        if let Err(e) = console.refresh().await {
            println!("Could not load pending corrections: {}", e);
            return;
        }
        if console.items().is_empty() {
            println!("No pending corrections.");
            return;
        }
        for item in console.items() {
            println!("  [{}] {}", item.correction.id, item.correction.query);
            println!("      answer: {}", item.correction.bot_response);
            println!("      flagged because: {}", item.correction.reason);
        }
        println!("/approve <id>, /edit <id>, or /reject <id>");
    }

    async fn review(&mut self, rest: &str, command: ReviewCommand) {
        let id = rest.trim().to_string();
        if id.is_empty() {
            println!("Usage: /approve|/edit|/reject <correction id>");
            return;
        }
        let Some(console) = self.console.as_mut() else {
            println!("Review console disabled - set PHAROS_REVIEWER_TOKEN and restart.");
            return;
        };

        match command {
            ReviewCommand::Approve => match console.approve(&id).await {
                Ok(()) => println!("Correction {} approved.", id),
                Err(e) => println!("Review failed: {}", e),
            },
            ReviewCommand::Reject => match console.reject(&id).await {
                Ok(()) => println!("Correction {} rejected.", id),
                Err(e) => println!("Review failed: {}", e),
            },
            ReviewCommand::Edit => match console.begin_edit(&id).map(str::to_string) {
                Ok(draft) => {
                    println!("Current answer:\n  {}", draft);
                    println!("Type the corrected answer (empty line keeps it as is, /cancel aborts):");
                    self.editing = Some(id);
                }
                Err(e) => println!("Review failed: {}", e),
            },
        }
    }

    async fn finish_edit(&mut self, line: &str) {
        let Some(id) = self.editing.take() else { return };
        let Some(console) = self.console.as_mut() else { return };

        if line == "/cancel" {
            match console.cancel_edit(&id) {
                Ok(()) => println!("Edit discarded, correction {} still pending.", id),
                Err(e) => println!("Could not cancel: {}", e),
            }
            return;
        }
        if !line.is_empty() {
            if let Err(e) = console.set_draft(&id, line) {
                println!("Could not update draft: {}", e);
                return;
            }
        }
        match console.submit_edit(&id).await {
            Ok(()) => println!("Correction {} approved with your edit.", id),
            Err(e) => println!("Review failed: {}", e),
        }
    }
}

enum ReviewCommand {
    Approve,
    Reject,
    Edit,
}

fn print_message(index: usize, message: &Message) {
    let speaker = match message.role {
        Role::User => "you",
        Role::Assistant => "pharos",
    };
    println!("[{}] {}: {}", index, speaker, message.content);
}

fn print_help(reviewer: bool) {
    println!("  <text>            ask a question");
    println!("  /flag <n> <why>   flag answer n as wrong");
    println!("  /up <n> /down <n> rate answer n");
    println!("  /notifications    show review notifications");
    println!("  /read <id>        mark one notification read");
    println!("  /readall          mark all notifications read");
    println!("  /view <id>        view a reviewed correction");
    println!("  /new              start a fresh chat session");
    println!("  /quit             exit");
    if reviewer {
        println!("  /pending          list corrections awaiting review");
        println!("  /approve <id>     confirm the original answer");
        println!("  /edit <id>        approve with a corrected answer");
        println!("  /reject <id>      reject the flag");
    }
}
