use ripstation::{
    job::JobState,
    machine::{Effect, Event, transition},
};

const OK: Event = Event::Succeeded;
const FAIL: Event = Event::Failed {
    unrecoverable: false,
};
const HANG: Event = Event::Failed {
    unrecoverable: true,
};

#[test]
fn happy_path_visits_every_state_in_order() {
    let mut state = JobState::Idle;
    let mut effects = Vec::new();
    let mut visited = vec![state];

    let mut step = transition(state, Event::Submitted).unwrap();
    loop {
        state = step.next;
        visited.push(state);
        effects.extend(step.effects.iter().copied());
        if state.is_terminal() {
            break;
        }
        step = transition(state, OK).unwrap();
    }

    assert_eq!(
        visited,
        vec![
            JobState::Idle,
            JobState::Loading,
            JobState::Classifying,
            JobState::Processing,
            JobState::Verifying,
            JobState::Recording,
            JobState::Ejecting,
            JobState::Done,
        ]
    );
    assert_eq!(
        effects,
        vec![
            Effect::Load,
            Effect::Classify,
            Effect::Process,
            Effect::Verify,
            Effect::Record,
            Effect::Eject,
        ]
    );
}

#[test]
fn load_failure_rejects() {
    let step = transition(JobState::Loading, FAIL).unwrap();
    assert_eq!(step.next, JobState::Rejected);
    assert_eq!(step.effects, vec![Effect::Record, Effect::Reject]);
}

#[test]
fn classify_failure_fails_and_still_ejects() {
    let step = transition(JobState::Classifying, FAIL).unwrap();
    assert_eq!(step.next, JobState::Failed);
    assert_eq!(step.effects, vec![Effect::Record, Effect::Eject]);
}

#[test]
fn timeouts_during_classify_or_processing_reject() {
    for state in [JobState::Classifying, JobState::Processing] {
        let step = transition(state, HANG).unwrap();
        assert_eq!(step.next, JobState::Rejected, "from {state:?}");
        assert_eq!(step.effects, vec![Effect::Record, Effect::Reject]);
    }
}

#[test]
fn processing_and_verification_failures_fail() {
    for state in [JobState::Processing, JobState::Verifying] {
        let step = transition(state, FAIL).unwrap();
        assert_eq!(step.next, JobState::Failed, "from {state:?}");
    }
}

#[test]
fn eject_failure_still_reaches_done() {
    let step = transition(JobState::Ejecting, FAIL).unwrap();
    assert_eq!(step.next, JobState::Done);
    assert!(step.effects.is_empty());
}

#[test]
fn quit_before_start_rejects_without_hardware() {
    let step = transition(JobState::Idle, Event::QuitRequested).unwrap();
    assert_eq!(step.next, JobState::Rejected);
    assert_eq!(step.effects, vec![Effect::Record]);
}

#[test]
fn terminal_states_accept_no_events() {
    for state in [JobState::Done, JobState::Failed, JobState::Rejected] {
        for event in [OK, FAIL, Event::Submitted, Event::QuitRequested] {
            assert!(transition(state, event).is_err());
        }
    }
}

#[test]
fn every_non_terminal_outcome_terminates() {
    // Whatever the outcomes, a job can never loop or stall in a non-terminal state.
    let outcomes = [OK, FAIL, HANG];
    for a in outcomes {
        for b in outcomes {
            for c in outcomes {
                let mut state = transition(JobState::Idle, Event::Submitted).unwrap().next;
                let mut seq = [a, b, c, OK, OK, OK, OK].into_iter();
                let mut steps = 0;
                while !state.is_terminal() {
                    let ev = seq.next().unwrap_or(OK);
                    state = transition(state, ev).unwrap().next;
                    steps += 1;
                    assert!(steps <= 8);
                }
            }
        }
    }
}
