//! Module capability contract.
//!
//! Every subsystem reachable through the dispatch server implements
//! [`Subsystem`]: a closed verb enum plus one handler that maps
//! `(verb, options)` to a [`Reply`]. The object-safe [`DetectorModule`]
//! trait is derived from it by a blanket impl, so the registry can hold
//! heterogeneous modules as trait objects.
//!
//! # Contract
//!
//! - The verb set is fixed at construction (`Verb::ALL`).
//! - A handler always returns a structured [`Reply`]. Hardware or peer
//!   failures are reported as `Reply::Error`, never propagated.
//!
//! # Example
//!
//! ```rust
//! use growth_common::module::{DetectorModule, Subsystem, Verb};
//! use growth_common::protocol::{Options, Reply};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum EchoVerb { Ping }
//!
//! impl Verb for EchoVerb {
//!     const ALL: &'static [Self] = &[EchoVerb::Ping];
//!     fn as_str(self) -> &'static str { "ping" }
//! }
//!
//! struct Echo;
//!
//! impl Subsystem for Echo {
//!     type Verb = EchoVerb;
//!     fn handle(&mut self, _verb: EchoVerb, _options: &Options) -> Reply {
//!         Reply::ok()
//!     }
//! }
//!
//! let mut module: Box<dyn DetectorModule> = Box::new(Echo);
//! assert_eq!(module.verbs(), vec!["ping"]);
//! assert!(module.invoke("ping", &Options::new()).is_some());
//! assert!(module.invoke("pong", &Options::new()).is_none());
//! ```

use crate::protocol::{Options, Reply};
use std::fmt::Debug;

/// Closed set of verbs served by one module.
pub trait Verb: Copy + Eq + Debug + Send + 'static {
    /// Every verb, in declaration order.
    const ALL: &'static [Self];

    /// Wire name of the verb.
    fn as_str(self) -> &'static str;

    /// Look up a verb by wire name.
    fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == name)
    }
}

/// Typed module implementation.
pub trait Subsystem: Send {
    /// Verbs served by this module.
    type Verb: Verb;

    /// Execute one verb.
    fn handle(&mut self, verb: Self::Verb, options: &Options) -> Reply;
}

/// Object-safe view of a module, as held by the registry.
pub trait DetectorModule: Send {
    /// Wire names of every verb served.
    fn verbs(&self) -> Vec<&'static str>;

    /// Invoke a verb by wire name. `None` if the verb is not served.
    fn invoke(&mut self, verb: &str, options: &Options) -> Option<Reply>;
}

impl<S: Subsystem> DetectorModule for S {
    fn verbs(&self) -> Vec<&'static str> {
        S::Verb::ALL.iter().map(|v| v.as_str()).collect()
    }

    fn invoke(&mut self, verb: &str, options: &Options) -> Option<Reply> {
        let verb = S::Verb::parse(verb)?;
        Some(self.handle(verb, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum CounterVerb {
        Increment,
        Get,
    }

    impl Verb for CounterVerb {
        const ALL: &'static [Self] = &[CounterVerb::Increment, CounterVerb::Get];

        fn as_str(self) -> &'static str {
            match self {
                CounterVerb::Increment => "increment",
                CounterVerb::Get => "get",
            }
        }
    }

    #[derive(Default)]
    struct Counter {
        value: u32,
    }

    impl Subsystem for Counter {
        type Verb = CounterVerb;

        fn handle(&mut self, verb: CounterVerb, _options: &Options) -> Reply {
            match verb {
                CounterVerb::Increment => {
                    self.value += 1;
                    Reply::ok()
                }
                CounterVerb::Get => Reply::ok().with("value", self.value),
            }
        }
    }

    #[test]
    fn verb_parse_matches_wire_names() {
        assert_eq!(CounterVerb::parse("get"), Some(CounterVerb::Get));
        assert_eq!(CounterVerb::parse("GET"), None);
    }

    #[test]
    fn blanket_impl_routes_by_name() {
        let mut module: Box<dyn DetectorModule> = Box::new(Counter::default());
        assert_eq!(module.verbs(), vec!["increment", "get"]);

        module.invoke("increment", &Options::new());
        module.invoke("increment", &Options::new());
        let reply = module.invoke("get", &Options::new()).unwrap();
        assert_eq!(reply.field("value"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn unknown_verb_invokes_nothing() {
        let mut counter = Counter::default();
        assert!(DetectorModule::invoke(&mut counter, "reset", &Options::new()).is_none());
        assert_eq!(counter.value, 0);
    }
}
