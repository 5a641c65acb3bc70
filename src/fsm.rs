//! Guarded-transition state machine engine.
//!
//! A machine is a current state plus a priority-ordered table of
//! [`Transition`]s. Each call to [`fire`] scans the table in declared order,
//! considers only rows leaving the current state, and fires the first row
//! whose guard holds: the optional action runs, then the state moves.
//! At most one transition fires per call. Rows listed earlier win when
//! several guards hold at once.
//!
//! The engine knows nothing about the domain. Guards and actions are plain
//! function pointers that receive the owning machine and its environment
//! (the hardware port, or the collaborating machines) as explicit
//! parameters.

/// One row of a transition table.
pub struct Transition<S, M, E: ?Sized> {
    /// State this row leaves from.
    pub from: S,
    /// Predicate over the machine and its environment.
    pub guard: fn(&M, &mut E) -> bool,
    /// State entered when the row fires.
    pub to: S,
    /// Side effect executed only when the row fires.
    pub action: Option<fn(&mut M, &mut E)>,
}

impl<S, M, E: ?Sized> Transition<S, M, E> {
    /// Row without an action.
    pub const fn new(from: S, guard: fn(&M, &mut E) -> bool, to: S) -> Self {
        Self {
            from,
            guard,
            to,
            action: None,
        }
    }

    /// Row that runs `action` when it fires.
    pub const fn with_action(
        from: S,
        guard: fn(&M, &mut E) -> bool,
        to: S,
        action: fn(&mut M, &mut E),
    ) -> Self {
        Self {
            from,
            guard,
            to,
            action: Some(action),
        }
    }
}

/// Current-state holder embedded in every domain machine.
///
/// The state is only ever written by [`fire`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fsm<S> {
    current: S,
}

impl<S: Copy> Fsm<S> {
    /// Start in the `from` state of the table's first row.
    ///
    /// Panics on an empty table, which is a programming error in the
    /// table definition.
    pub const fn from_table<M, E: ?Sized>(table: &[Transition<S, M, E>]) -> Self {
        Self {
            current: table[0].from,
        }
    }

    /// Current state.
    pub const fn state(&self) -> S {
        self.current
    }
}

/// A domain machine driven by the engine.
///
/// `E` is the environment handed to guards and actions. Tables are static
/// data shared by every instance of the machine.
pub trait StateMachine<E: ?Sized + 'static>: Sized + 'static {
    /// Domain state enumeration.
    type State: Copy + PartialEq + 'static;

    /// Priority-ordered transition table.
    const TRANSITIONS: &'static [Transition<Self::State, Self, E>];

    /// Embedded engine state.
    fn fsm(&self) -> &Fsm<Self::State>;

    /// Mutable access for the dispatcher.
    fn fsm_mut(&mut self) -> &mut Fsm<Self::State>;
}

/// Run one dispatch step. Returns `true` if a transition fired.
pub fn fire<M, E>(machine: &mut M, env: &mut E) -> bool
where
    M: StateMachine<E>,
    E: ?Sized + 'static,
{
    let current = machine.fsm().current;
    for transition in M::TRANSITIONS.iter().filter(|t| t.from == current) {
        if (transition.guard)(machine, env) {
            if let Some(action) = transition.action {
                action(machine, env);
            }
            machine.fsm_mut().current = transition.to;
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Lamp {
        Dark,
        Lit,
        Broken,
    }

    #[derive(Default)]
    struct Inputs {
        switch_on: bool,
        overload: bool,
    }

    struct Bulb {
        fsm: Fsm<Lamp>,
        flips: u32,
    }

    impl Bulb {
        fn new() -> Self {
            Self {
                fsm: Fsm::from_table(<Self as StateMachine<Inputs>>::TRANSITIONS),
                flips: 0,
            }
        }

        fn check_on(&self, inputs: &mut Inputs) -> bool {
            inputs.switch_on
        }

        fn check_off(&self, inputs: &mut Inputs) -> bool {
            !inputs.switch_on
        }

        fn check_overload(&self, inputs: &mut Inputs) -> bool {
            inputs.overload
        }

        fn do_flip(&mut self, _inputs: &mut Inputs) {
            self.flips += 1;
        }
    }

    impl StateMachine<Inputs> for Bulb {
        type State = Lamp;

        const TRANSITIONS: &'static [Transition<Lamp, Self, Inputs>] = &[
            Transition::with_action(Lamp::Dark, Self::check_on, Lamp::Lit, Self::do_flip),
            Transition::new(Lamp::Lit, Self::check_overload, Lamp::Broken),
            Transition::with_action(Lamp::Lit, Self::check_off, Lamp::Dark, Self::do_flip),
        ];

        fn fsm(&self) -> &Fsm<Lamp> {
            &self.fsm
        }

        fn fsm_mut(&mut self) -> &mut Fsm<Lamp> {
            &mut self.fsm
        }
    }

    #[test]
    fn starts_in_first_rows_source_state() {
        let bulb = Bulb::new();
        assert_eq!(bulb.fsm.state(), Lamp::Dark);
    }

    #[test]
    fn no_matching_guard_is_a_no_op() {
        let mut bulb = Bulb::new();
        let mut inputs = Inputs::default();
        assert!(!fire(&mut bulb, &mut inputs));
        assert_eq!(bulb.fsm.state(), Lamp::Dark);
        assert_eq!(bulb.flips, 0);
    }

    #[test]
    fn fires_at_most_one_transition_per_call() {
        let mut bulb = Bulb::new();
        let mut inputs = Inputs {
            switch_on: true,
            overload: false,
        };
        assert!(fire(&mut bulb, &mut inputs));
        assert_eq!(bulb.fsm.state(), Lamp::Lit);
        assert_eq!(bulb.flips, 1);

        inputs.switch_on = false;
        assert!(fire(&mut bulb, &mut inputs));
        assert_eq!(bulb.fsm.state(), Lamp::Dark);
        assert_eq!(bulb.flips, 2);
    }

    #[test]
    fn earlier_row_wins_when_several_guards_hold() {
        let mut bulb = Bulb::new();
        let mut inputs = Inputs {
            switch_on: true,
            overload: false,
        };
        fire(&mut bulb, &mut inputs);

        // Both "overload" and "off" hold; overload is listed first.
        inputs.switch_on = false;
        inputs.overload = true;
        fire(&mut bulb, &mut inputs);
        assert_eq!(bulb.fsm.state(), Lamp::Broken);
        assert_eq!(bulb.flips, 1);
    }

    #[test]
    fn guards_of_other_states_are_not_evaluated() {
        struct Counting {
            fsm: Fsm<Lamp>,
        }

        fn never(_: &Counting, calls: &mut u32) -> bool {
            *calls += 1;
            false
        }

        impl StateMachine<u32> for Counting {
            type State = Lamp;
            const TRANSITIONS: &'static [Transition<Lamp, Self, u32>] = &[
                Transition::new(Lamp::Dark, never, Lamp::Lit),
                Transition::new(Lamp::Lit, never, Lamp::Dark),
                Transition::new(Lamp::Broken, never, Lamp::Dark),
            ];
            fn fsm(&self) -> &Fsm<Lamp> {
                &self.fsm
            }
            fn fsm_mut(&mut self) -> &mut Fsm<Lamp> {
                &mut self.fsm
            }
        }

        let mut machine = Counting {
            fsm: Fsm::from_table(<Counting as StateMachine<u32>>::TRANSITIONS),
        };
        let mut calls = 0;
        fire(&mut machine, &mut calls);
        assert_eq!(calls, 1);
    }
}
