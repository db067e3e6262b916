//! The conversation state machine as a pure function.
//!
//! [`plan`] maps the current [`ConversationState`] and a decoded [`Input`] to
//! an ordered list of [`Effect`]s. It performs no I/O; the engine executes the
//! effects in order and stops at the first failure. The state write
//! ([`Effect::Enter`]) follows the data writes of each row, so a failed data
//! write never commits a state change.

use taskbot_proto::action::{ButtonAction, Command, Input};
use taskbot_proto::state::ConversationState;
use taskbot_proto::task;

use super::reply::{NamePurpose, Reply};

/// One step of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Drain the ledger and delete the recorded messages.
    ClearScreen,
    /// Persist a new conversation state.
    Enter(ConversationState),
    /// Start a draft task.
    CreateDraft,
    /// Set the draft's name.
    NameDraft(String),
    /// Set the draft's description and finish it.
    FinishDraft(String),
    /// Delete the draft.
    DiscardDraft,
    /// Delete finished tasks with this name.
    DeleteTask(String),
    /// Send one card per finished task.
    RenderTasks,
    /// Report the outcome of the preceding [`Effect::DeleteTask`].
    SayOutcome,
    /// Send a canned message.
    Say(Reply),
}

/// Ordered effects for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// Effects in execution order.
    pub effects: Vec<Effect>,
}

impl Transition {
    fn of(effects: impl Into<Vec<Effect>>) -> Self {
        Self {
            effects: effects.into(),
        }
    }

    /// A transition that does nothing.
    #[must_use]
    pub const fn ignored() -> Self {
        Self {
            effects: Vec::new(),
        }
    }

    /// Returns `true` if the input is ignored.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.effects.is_empty()
    }

    /// State after all effects have run: the last [`Effect::Enter`], or
    /// `current` if there is none.
    #[must_use]
    pub fn next_state(&self, current: ConversationState) -> ConversationState {
        self.effects
            .iter()
            .rev()
            .find_map(|effect| match effect {
                Effect::Enter(state) => Some(*state),
                _ => None,
            })
            .unwrap_or(current)
    }
}

/// Plan the effects of `input` arriving while the chat is in `state`.
#[must_use]
pub fn plan(state: ConversationState, input: &Input) -> Transition {
    use ConversationState as S;
    use Effect as E;

    match (state, input) {
        (S::Default, Input::Command(cmd)) => plan_idle_command(*cmd),
        (S::Default, Input::Text(_) | Input::Unrecognized(_)) => {
            Transition::of([E::ClearScreen, E::Say(Reply::Menu)])
        }
        (S::Default | S::AwaitingDeletionTarget, Input::Button(ButtonAction::DeleteTask(name))) => {
            Transition::of([
                E::Enter(S::AwaitingDeletionTarget),
                E::ClearScreen,
                E::DeleteTask(name.clone()),
                E::Enter(S::Default),
                E::RenderTasks,
                E::SayOutcome,
                E::Say(Reply::Menu),
            ])
        }

        (S::AwaitingTaskName | S::AwaitingTaskDescription, Input::Command(Command::Cancel)) => {
            Transition::of([
                E::DiscardDraft,
                E::Enter(S::Default),
                E::ClearScreen,
                E::Say(Reply::Canceled),
                E::Say(Reply::Menu),
            ])
        }
        (S::AwaitingTaskName | S::AwaitingTaskDescription, Input::Command(_) | Input::Button(_)) => {
            Transition::of([E::Say(Reply::FinishLastAction)])
        }
        (S::AwaitingTaskName, Input::Text(text)) => match task::normalize_name(text) {
            Ok(name) => Transition::of([
                E::ClearScreen,
                E::NameDraft(name),
                E::Enter(S::AwaitingTaskDescription),
                E::Say(Reply::AskTaskDescription),
            ]),
            Err(e) => Transition::of([E::Say(Reply::InvalidName(e))]),
        },
        (S::AwaitingTaskDescription, Input::Text(text)) => {
            match task::normalize_description(text) {
                Ok(description) => Transition::of([
                    E::ClearScreen,
                    E::FinishDraft(description),
                    E::Enter(S::Default),
                    E::Say(Reply::TaskCreated),
                    E::Say(Reply::Menu),
                ]),
                Err(e) => Transition::of([E::Say(Reply::InvalidDescription(e))]),
            }
        }

        (S::AwaitingDeletionTarget, Input::Command(Command::Cancel)) => Transition::of([
            E::Enter(S::Default),
            E::ClearScreen,
            E::Say(Reply::Canceled),
        ]),
        (S::AwaitingDeletionTarget, Input::Command(_)) => {
            Transition::of([E::Say(Reply::FinishLastAction)])
        }
        (S::AwaitingDeletionTarget, Input::Text(text)) => Transition::of([
            E::ClearScreen,
            E::DeleteTask(text.trim().to_string()),
            E::Enter(S::Default),
            E::SayOutcome,
            E::Say(Reply::Menu),
        ]),

        (
            S::AwaitingTaskName | S::AwaitingTaskDescription | S::AwaitingDeletionTarget,
            Input::Unrecognized(_),
        ) => Transition::ignored(),
    }
}

fn plan_idle_command(cmd: Command) -> Transition {
    use Effect as E;

    match cmd {
        Command::Start => {
            Transition::of([E::ClearScreen, E::Say(Reply::Greeting), E::Say(Reply::Menu)])
        }
        Command::NewTask => Transition::of([
            E::ClearScreen,
            E::CreateDraft,
            E::Enter(ConversationState::AwaitingTaskName),
            E::Say(Reply::AskTaskName(NamePurpose::Create)),
        ]),
        Command::DeleteTask => Transition::of([
            E::ClearScreen,
            E::Enter(ConversationState::AwaitingDeletionTarget),
            E::Say(Reply::AskTaskName(NamePurpose::Delete)),
        ]),
        Command::ListTasks => {
            Transition::of([E::ClearScreen, E::RenderTasks, E::Say(Reply::Menu)])
        }
        Command::Cancel => Transition::of([E::Say(Reply::NothingToCancel)]),
    }
}
