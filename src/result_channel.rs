//! Reconciles the two ways a [`CommandResult`] reaches the client: as the
//! direct answer to a submitted command, or pushed by the backend on its own.
//!
//! Results carry no request id, so attribution goes by arrival order: a push
//! while a command is in flight is that command's answer, whichever of the
//! two paths wins the race. Every logical command gets a [`Generation`];
//! unsolicited pushes get a fresh one. The presentation layer uses
//! generations to refuse stale updates.

use crate::backend::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    #[cfg(test)]
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }
}

/// Handle for one submitted command.
#[derive(Debug)]
pub struct Ticket {
    generation: Generation,
}

impl Ticket {
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

/// A result that became current.
#[derive(Clone, Debug, PartialEq)]
pub struct Accepted {
    pub generation: Generation,
    pub command: String,
    pub result: CommandResult,
    /// False for pushes nobody was waiting for.
    pub solicited: bool,
}

struct InFlight {
    generation: Generation,
    command: String,
    resolved: bool,
}

#[derive(Default)]
pub struct ResultChannel {
    last_generation: u64,
    in_flight: Option<InFlight>,
    current: Option<(Generation, CommandResult)>,
}

impl ResultChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a submitted command. A command still marked in flight is
    /// superseded.
    pub fn begin(&mut self, command: &str) -> Ticket {
        let generation = self.next_generation();
        self.in_flight = Some(InFlight {
            generation,
            command: command.to_owned(),
            resolved: false,
        });
        Ticket { generation }
    }

    /// The direct answer for `ticket`, if the executor produced one. Returns
    /// nothing when a push already answered the command or there is no
    /// result.
    pub fn complete(&mut self, ticket: Ticket, result: Option<CommandResult>) -> Option<Accepted> {
        let in_flight = self.in_flight.take_if(|f| f.generation == ticket.generation);
        let result = result?;

        match in_flight {
            Some(InFlight { resolved: true, .. }) => None,
            Some(InFlight { command, .. }) => {
                Some(self.accept(ticket.generation, command, result, true))
            }
            // superseded by a newer command
            None => None,
        }
    }

    pub fn push(&mut self, result: CommandResult) -> Option<Accepted> {
        if let Some(in_flight) = self.in_flight.as_mut().filter(|f| !f.resolved) {
            in_flight.resolved = true;
            let (generation, command) = (in_flight.generation, in_flight.command.clone());
            return Some(self.accept(generation, command, result, true));
        }

        if self.current.as_ref().is_some_and(|(_, current)| *current == result) {
            return None;
        }

        let generation = self.next_generation();
        let command = result.original_command().unwrap_or_default().to_owned();
        Some(self.accept(generation, command, result, false))
    }

    #[cfg(test)]
    fn current(&self) -> Option<&CommandResult> {
        self.current.as_ref().map(|(_, result)| result)
    }

    #[cfg(test)]
    fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    fn accept(
        &mut self,
        generation: Generation,
        command: String,
        result: CommandResult,
        solicited: bool,
    ) -> Accepted {
        self.current = Some((generation, result.clone()));
        Accepted {
            generation,
            command,
            result,
            solicited,
        }
    }

    fn next_generation(&mut self) -> Generation {
        self.last_generation += 1;
        Generation(self.last_generation)
    }
}
