//! TUI module using ratatui.
//!
//! The popup: analyzes the page on open and lets the reader walk through
//! the four summary levels. Requests to the orchestrator run on spawned
//! tasks and report back over a channel, so the screen never blocks.

pub mod components;
pub mod state;

pub use components::Header;
pub use state::{Action, PopupState, View};

use crate::agent::Summarizer;
use crate::orchestrator::Orchestrator;
use crate::protocol::{Request, Response};
use crate::scraper::PageChannel;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::DefaultTerminal;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug;

/// How long to wait for input before checking for responses
const TICK: Duration = Duration::from_millis(100);

/// Run the popup until the user quits
pub async fn run<P, S>(orchestrator: Arc<Orchestrator<P, S>>, header: Header) -> io::Result<()>
where
    P: PageChannel + 'static,
    S: Summarizer + 'static,
{
    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, orchestrator, header).await;
    ratatui::restore();
    result
}

async fn event_loop<P, S>(
    terminal: &mut DefaultTerminal,
    orchestrator: Arc<Orchestrator<P, S>>,
    mut header: Header,
) -> io::Result<()>
where
    P: PageChannel + 'static,
    S: Summarizer + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut state = PopupState::default();
    send(&orchestrator, &tx, vec![Request::AnalyzePage]);

    loop {
        while let Ok(response) = rx.try_recv() {
            state.apply_response(response);
        }
        if header.title.is_none() {
            header.title = orchestrator.page().title();
        }
        terminal.draw(|frame| components::render(frame, &state, &header))?;

        if !event::poll(TICK)? {
            tokio::task::yield_now().await;
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match state.handle_key(key.code) {
            Some(Action::Quit) => return Ok(()),
            Some(Action::Send(request)) => send(&orchestrator, &tx, vec![request]),
            Some(Action::SaveKey(key)) => send(
                &orchestrator,
                &tx,
                vec![Request::SetApiKey { payload: key }, Request::AnalyzePage],
            ),
            None => {}
        }
    }
}

/// Run requests in order on a background task, forwarding every response.
///
/// If the popup closes first the task is abandoned, not cancelled.
fn send<P, S>(
    orchestrator: &Arc<Orchestrator<P, S>>,
    tx: &UnboundedSender<Response>,
    requests: Vec<Request>,
) where
    P: PageChannel + 'static,
    S: Summarizer + 'static,
{
    let orchestrator = Arc::clone(orchestrator);
    let tx = tx.clone();
    tokio::spawn(async move {
        for request in requests {
            debug!(?request, "popup request");
            let response = orchestrator.handle(request).await;
            if tx.send(response).is_err() {
                break;
            }
        }
    });
}
