//! The opcode registry: the seam between the machine and module opcode
//! bodies.
//!
//! Grounded on `original_source/src/machine/module_manager.h`'s
//! `IModuleManager` (an `AttachModule`/`GetCommandName` interface the
//! machine consults rather than owning opcode implementations itself)
//! and spec.md §1's explicit exclusion of "individual opcode module
//! bodies (the machine invokes them through a registry)". This core
//! defines the registry and its dispatch/soft-fail behaviour; concrete
//! `OpcodeHandler` impls (the `obj`/`msg`/`flowctrl` module families)
//! are out of scope and plugged in by the host.

use std::collections::HashMap;

use rlvm_types::{Error, OpcodeKey, OpcodeTriple, Result};

use crate::expr::Expression;
use crate::machine::Machine;

/// One registered opcode implementation.
///
/// `name` feeds the `Undefined: name(...)` rendering for *other*
/// overloads of the same triple that *aren't* registered (see
/// [`OpcodeRegistry::name_hint`]); a handler that is actually dispatched
/// never needs to render its own name.
pub trait OpcodeHandler {
    /// A human-readable name for this opcode, used in diagnostics.
    fn name(&self) -> &str;

    /// Execute the opcode. May mutate memory, push a long operation,
    /// redirect the current frame's cursor, or halt the machine.
    fn call(&self, machine: &mut Machine<'_>, overload: u8, params: &[Expression]) -> Result<()>;
}

/// A read-only-after-setup table from `(triple, overload)` to handler.
///
/// Registration happens once during host initialisation
/// (spec.md §5's "opcode registry is set up once... and treated as
/// read-only thereafter"); nothing here mutates once the machine starts
/// ticking.
#[derive(Default)]
pub struct OpcodeRegistry {
    handlers: HashMap<OpcodeKey, Box<dyn OpcodeHandler>>,
    /// Whether an undefined-opcode dispatch should halt the machine
    /// (`Err(Error::Undefined)`) instead of logging and continuing.
    pub undefined_fatal: bool,
}

impl OpcodeRegistry {
    pub fn new() -> Self {
        OpcodeRegistry::default()
    }

    /// Register `handler` for the exact `(triple, overload)` key,
    /// replacing whatever was previously registered there.
    pub fn register(&mut self, triple: OpcodeTriple, overload: u8, handler: Box<dyn OpcodeHandler>) {
        self.handlers.insert(OpcodeKey { triple, overload }, handler);
    }

    /// Whether the registry has any scenario at all. Used by the CLI to
    /// warn the user before running with an empty registry (every
    /// command would soft-fail as undefined).
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// A best-effort display name for `(triple, overload)`, consulting
    /// any overload of the same triple if the exact overload isn't
    /// registered (module opcodes frequently share a name across
    /// overloads that only differ in argument shape).
    fn name_hint(&self, triple: OpcodeTriple, overload: u8) -> String {
        if let Some(h) = self.handlers.get(&OpcodeKey { triple, overload }) {
            return h.name().to_string();
        }
        self.handlers
            .iter()
            .find(|(k, _)| k.triple == triple)
            .map(|(_, h)| h.name().to_string())
            .unwrap_or_else(|| "?".to_string())
    }

    /// Dispatch `(triple, overload)` with `params`. An unregistered
    /// opcode is a soft failure by default (spec.md §7): the caller logs
    /// and moves on, unless [`Self::undefined_fatal`] is set.
    pub fn dispatch(
        &self,
        machine: &mut Machine<'_>,
        triple: OpcodeTriple,
        overload: u8,
        params: &[Expression],
    ) -> Result<()> {
        let key = OpcodeKey { triple, overload };
        match self.handlers.get(&key) {
            Some(handler) => handler.call(machine, overload, params),
            None => {
                let err = Error::Undefined {
                    name: self.name_hint(triple, overload),
                    triple,
                    overload,
                };
                if self.undefined_fatal {
                    Err(err)
                } else {
                    tracing::warn!(%err, "undefined opcode, skipping");
                    Ok(())
                }
            }
        }
    }
}
