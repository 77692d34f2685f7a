//! The turn driver.
//!
//! A [`Controller`] owns the game, the settings, the selection state machine and the
//! hint slot, and runs as one task. Each step renders the live position, then
//! either waits for the human (serving clicks, menu actions and hint replies
//! meanwhile) or for the engine, applies the chosen move and steps again.
//!
//! Every state change happens between two `.await`s of that one task, so the only
//! concurrency is the analysis worker behind the [`AnalysisChannel`].

use shakmaty::{Role, Square};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{AnalysisChannel, AnalysisError, PendingSearch, SearchRequest};
use crate::config::Timing;
use crate::hint::{self, HintSlot};
use crate::oracle::{CandidateMove, Game, GameError, GamePosition};
use crate::selection::{ClickOutcome, Selection};
use crate::settings::{Mover, Settings, SettingsUpdate};
use crate::skill::SkillLevel;
use crate::store::{self, GameStore};
use crate::view::BoardView;

/// Plies taken back by [`UiEvent::Undo`]: the engine's reply and the human's move.
const UNDO_PLIES: usize = 2;

/// Input from the front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    Click(Square),
    Promote(Role),
    Configure(SettingsUpdate),
    Undo,
    Restart,
    SwapSides,
    Shutdown,
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Engine(#[from] AnalysisError),

    /// The engine's reply named no legal move.
    #[error("engine produced no legal move in {fen}")]
    NoEngineMove { fen: String },

    #[error(transparent)]
    Game(#[from] GameError),
}

enum Flow {
    Continue,
    Shutdown,
}

/// What a menu action requires of the current turn.
enum Interrupt {
    None,
    Restep,
    Shutdown,
}

pub struct Controller<V> {
    game: Game,
    settings: Settings,
    view: V,
    channel: AnalysisChannel,
    timing: Timing,
    selection: Selection,
    hint: HintSlot,
    events: mpsc::UnboundedReceiver<UiEvent>,
    settings_store: Option<Box<dyn GameStore>>,
}

impl<V: BoardView> Controller<V> {
    /// Build a controller with default settings. Front-end input goes into the returned sender.
    pub fn new(
        game: Game,
        view: V,
        channel: AnalysisChannel,
        timing: Timing,
    ) -> (Self, mpsc::UnboundedSender<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Controller {
            game,
            settings: Settings::default(),
            view,
            channel,
            timing,
            selection: Selection::new(),
            hint: HintSlot::default(),
            events: rx,
            settings_store: None,
        };
        (controller, tx)
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Save the settings into `store` whenever they change.
    pub fn with_settings_store(mut self, store: impl GameStore + 'static) -> Self {
        self.settings_store = Some(Box::new(store));
        self
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// The one place settings change. Takes effect at the next turn decision.
    pub fn update_settings(&mut self, update: &SettingsUpdate) {
        if !self.settings.apply(update) {
            return;
        }
        info!(settings = ?self.settings, "settings changed");
        if let Some(store) = self.settings_store.as_mut() {
            if let Err(e) = store::save_settings(store.as_mut(), &self.settings) {
                warn!(error = %e, "failed to save settings");
            }
        }
    }

    /// Play until shut down, or until the engine fails.
    ///
    /// On error the game stays on the turn that failed; calling `run` again retries it.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        let result = self.drive().await;
        self.selection.disarm();
        self.cancel_hint();
        if let Err(e) = &result {
            self.view.show_error(Some(&e.to_string()));
        }
        result
    }

    /// Play until shut down. Engine failures are shown on the view and the
    /// failed turn is retried after `retry_backoff`. Menu actions still work
    /// while play is paused, and undo, restart or a side swap retry at once.
    pub async fn run_with_retry(&mut self) {
        while let Err(e) = self.run().await {
            warn!(error = %e, backoff = ?self.timing.retry_backoff, "play paused");
            if let Flow::Shutdown = self.pause().await {
                return;
            }
        }
    }

    async fn pause(&mut self) -> Flow {
        let backoff = tokio::time::sleep(self.timing.retry_backoff);
        tokio::pin!(backoff);
        loop {
            tokio::select! {
                _ = &mut backoff => return Flow::Continue,
                event = self.events.recv() => {
                    let Some(event) = event else {
                        return Flow::Shutdown;
                    };
                    match self.on_menu(event) {
                        Interrupt::None => {}
                        Interrupt::Restep => return Flow::Continue,
                        Interrupt::Shutdown => return Flow::Shutdown,
                    }
                }
            }
        }
    }

    async fn drive(&mut self) -> Result<(), ControllerError> {
        loop {
            if let Flow::Shutdown = self.step().await? {
                info!("controller shut down");
                return Ok(());
            }
        }
    }

    async fn step(&mut self) -> Result<Flow, ControllerError> {
        let position = self.game.position().clone();
        self.view.set_position(position.fen(), position.in_check());

        if let Some(outcome) = self.game.outcome() {
            info!(%outcome, "game over");
            self.cancel_hint();
            self.view.show_outcome(outcome);
            return self.await_menu_action().await;
        }

        match self.settings.mover(position.turn()) {
            Mover::Human => self.human_turn(position).await,
            Mover::Engine(skill) => self.engine_turn(position, skill).await,
        }
    }

    async fn human_turn(&mut self, position: GamePosition) -> Result<Flow, ControllerError> {
        debug!(fen = %position, "human to move");
        if self.settings.hints && !position.is_starting_position() {
            self.request_hint(&position);
        }

        let mut human_move = self.selection.arm(&mut self.view);
        loop {
            tokio::select! {
                biased;

                mv = &mut human_move => {
                    match mv {
                        Ok(mv) => self.play(&mv)?,
                        Err(_) => debug!("human move wait dropped"),
                    }
                    return Ok(Flow::Continue);
                }
                (captured, result) = self.hint.resolved() => self.show_hint(captured, result),
                event = self.events.recv() => {
                    let Some(event) = event else {
                        return Ok(Flow::Shutdown);
                    };
                    match event {
                        UiEvent::Click(square) => {
                            let outcome =
                                self.selection
                                    .click(square, self.game.position(), &mut self.view);
                            if let ClickOutcome::Selected(_) = outcome {
                                self.cancel_hint();
                            }
                        }
                        UiEvent::Promote(role) => {
                            self.selection.choose_promotion(role, &mut self.view);
                        }
                        other => match self.on_menu(other) {
                            Interrupt::None => {}
                            Interrupt::Restep => {
                                self.selection.disarm();
                                return Ok(Flow::Continue);
                            }
                            Interrupt::Shutdown => return Ok(Flow::Shutdown),
                        },
                    }
                }
            }
        }
    }

    async fn engine_turn(
        &mut self,
        position: GamePosition,
        skill: SkillLevel,
    ) -> Result<Flow, ControllerError> {
        debug!(fen = %position, %skill, "engine to move");
        self.cancel_hint();

        let request = SearchRequest::best_move(position.clone(), skill, self.timing.movetime);
        let mut search: PendingSearch = self.channel.search(request)?;
        let limit = self.timing.movetime + self.timing.reply_grace;
        let deadline = tokio::time::sleep(limit);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = &mut search => {
                    let Some(mv) = result? else {
                        return Err(ControllerError::NoEngineMove {
                            fen: position.fen().to_string(),
                        });
                    };
                    self.play(&mv)?;
                    self.view.mark_opponent_move(mv.from, mv.to);
                    return Ok(Flow::Continue);
                }
                _ = &mut deadline => {
                    warn!(id = %search.id(), ?limit, "engine did not answer");
                    let _ = self.channel.cancel();
                    return Err(AnalysisError::Timeout(limit).into());
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        return Ok(Flow::Shutdown);
                    };
                    match self.on_menu(event) {
                        Interrupt::None => {}
                        Interrupt::Restep => {
                            debug!(id = %search.id(), "engine search abandoned");
                            self.channel.cancel()?;
                            return Ok(Flow::Continue);
                        }
                        Interrupt::Shutdown => return Ok(Flow::Shutdown),
                    }
                }
            }
        }
    }

    /// After the game ended: only menu actions do anything.
    async fn await_menu_action(&mut self) -> Result<Flow, ControllerError> {
        while let Some(event) = self.events.recv().await {
            match self.on_menu(event) {
                Interrupt::None => {}
                Interrupt::Restep => return Ok(Flow::Continue),
                Interrupt::Shutdown => return Ok(Flow::Shutdown),
            }
        }
        Ok(Flow::Shutdown)
    }

    /// Handle anything but board input. Clicks and promotions are ignored here.
    fn on_menu(&mut self, event: UiEvent) -> Interrupt {
        match event {
            UiEvent::Click(_) | UiEvent::Promote(_) => Interrupt::None,
            UiEvent::Configure(update) => {
                self.update_settings(&update);
                Interrupt::None
            }
            UiEvent::Undo => {
                let undone = self.game.undo(UNDO_PLIES);
                info!(undone, "moves taken back");
                self.clear_marks();
                Interrupt::Restep
            }
            UiEvent::Restart => {
                info!("new game");
                self.game.reset();
                self.clear_marks();
                Interrupt::Restep
            }
            UiEvent::SwapSides => {
                let side = !self.settings.human_side;
                self.update_settings(&SettingsUpdate::human_side(side));
                self.clear_marks();
                Interrupt::Restep
            }
            UiEvent::Shutdown => Interrupt::Shutdown,
        }
    }

    fn play(&mut self, mv: &CandidateMove) -> Result<(), ControllerError> {
        let position = self.game.play(mv)?;
        info!(%mv, fen = %position, "move played");
        self.view.show_error(None);
        Ok(())
    }

    fn clear_marks(&mut self) {
        self.view.unselect_all_squares();
        self.view.show_error(None);
    }

    /// Ask for a hint on `position`. Hints are best effort: failures are only logged.
    fn request_hint(&mut self, position: &GamePosition) {
        self.cancel_hint();
        let request =
            SearchRequest::best_move(position.clone(), SkillLevel::MAX, self.timing.hint_movetime);
        match self.channel.search(request) {
            Ok(search) => {
                debug!(id = %search.id(), "hint requested");
                self.hint.replace(search);
            }
            Err(e) => warn!(error = %e, "hint unavailable"),
        }
    }

    /// Abandon the hint in flight, if any, and tell the worker to stop.
    fn cancel_hint(&mut self) {
        if self.hint.abandon() {
            if let Err(e) = self.channel.cancel() {
                debug!(error = %e, "could not stop hint search");
            }
        }
    }

    fn show_hint(
        &mut self,
        captured: GamePosition,
        result: Result<Option<CandidateMove>, AnalysisError>,
    ) {
        match result {
            Ok(hint) => {
                let resolution =
                    hint::settle(&captured, self.game.position(), hint.as_ref(), &mut self.view);
                debug!(?resolution, "hint settled");
            }
            Err(e) => warn!(error = %e, "hint search failed"),
        }
    }
}
