//! Operator Selection
//!
//! Turns an [`UpdateCandidateSet`] into a [`SelectionResult`] by asking an
//! [`Operator`]. Device numbers shown to the operator are one-based and
//! follow the candidate set's flat ordering. `N`/`n`, or closing input,
//! abandons at any prompt.

use std::io;
use tracing::debug;

use super::model::{Device, SelectionResult, UpdateCandidateSet, UpdateMode};

pub const DEVICE_PROMPT: &str = "Otherwise choose a device number: ";
pub const RELEASE_PROMPT: &str = "Otherwise choose downgrade number: ";

/// Result of asking the operator to pick a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    Selected(SelectionResult),
    NoCandidates,
    Abandoned,
}

/// The person (or script) answering selection prompts.
pub trait Operator {
    fn show_candidates(&mut self, candidates: &UpdateCandidateSet);

    /// Releases of the chosen device, for the downgrade prompt.
    fn show_releases(&mut self, device: &Device);

    /// Read one answer; `Ok(None)` means input was closed.
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>>;

    fn invalid_choice(&mut self);
}

enum Answer {
    Abandon,
    Choice(usize),
}

/// Ask until a valid one-based number in `1..=count`, or an abandon.
fn ask_number<O: Operator + ?Sized>(operator: &mut O, prompt: &str, count: usize) -> io::Result<Answer> {
    loop {
        let line = match operator.ask(prompt)? {
            Some(line) => line,
            None => return Ok(Answer::Abandon),
        };
        let answer = line.trim();
        if answer.eq_ignore_ascii_case("n") {
            return Ok(Answer::Abandon);
        }
        match answer.parse::<usize>() {
            Ok(number) if (1..=count).contains(&number) => return Ok(Answer::Choice(number - 1)),
            _ => {
                debug!(answer, count, "invalid choice");
                operator.invalid_choice();
            }
        }
    }
}

/// Drive the selection dialogue for one run.
///
/// Update mode picks a device and installs its latest release; downgrade
/// mode follows with a second prompt for the release.
pub fn select<O: Operator + ?Sized>(
    candidates: &UpdateCandidateSet,
    operator: &mut O,
) -> io::Result<SelectionOutcome> {
    if candidates.is_empty() {
        return Ok(SelectionOutcome::NoCandidates);
    }
    operator.show_candidates(candidates);

    let flat = match ask_number(operator, DEVICE_PROMPT, candidates.len())? {
        Answer::Choice(index) => index,
        Answer::Abandon => return Ok(SelectionOutcome::Abandoned),
    };
    let (domain, device_index) = match candidates.resolve(flat) {
        Some(resolved) => resolved,
        None => return Ok(SelectionOutcome::Abandoned),
    };

    let release_index = match candidates.mode {
        UpdateMode::Update => None,
        UpdateMode::Downgrade => {
            let device = &candidates.devices(domain)[device_index];
            operator.show_releases(device);
            match ask_number(operator, RELEASE_PROMPT, device.releases.len())? {
                Answer::Choice(index) => Some(index),
                Answer::Abandon => return Ok(SelectionOutcome::Abandoned),
            }
        }
    };

    Ok(SelectionOutcome::Selected(SelectionResult {
        domain,
        device_index,
        release_index,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::updater::metadata::parse_inventory;
    use crate::engine::updater::model::Domain;
    use std::collections::VecDeque;

    const DEVICES: &str = include_str!("../../../tests/fixtures/get_devices.json");

    #[derive(Default)]
    struct Scripted {
        answers: VecDeque<String>,
        prompts: Vec<String>,
        invalid: usize,
        releases_shown: usize,
    }

    impl Scripted {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(|a| a.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl Operator for Scripted {
        fn show_candidates(&mut self, _candidates: &UpdateCandidateSet) {}

        fn show_releases(&mut self, _device: &Device) {
            self.releases_shown += 1;
        }

        fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
            self.prompts.push(prompt.to_string());
            Ok(self.answers.pop_front())
        }

        fn invalid_choice(&mut self) {
            self.invalid += 1;
        }
    }

    fn candidates(mode: UpdateMode, usbvm: bool) -> UpdateCandidateSet {
        let admin = parse_inventory(DEVICES, Domain::AdminVm, mode).unwrap();
        let usb = usbvm.then(|| parse_inventory(DEVICES, Domain::UsbVm, mode).unwrap());
        UpdateCandidateSet::build(mode, admin, usb)
    }

    #[test]
    fn test_update_selection() {
        let set = candidates(UpdateMode::Update, false);
        let mut op = Scripted::new(&["1"]);
        let outcome = select(&set, &mut op).unwrap();
        assert_eq!(
            outcome,
            SelectionOutcome::Selected(SelectionResult {
                domain: Domain::AdminVm,
                device_index: 0,
                release_index: None,
            })
        );
        assert_eq!(op.prompts, vec![DEVICE_PROMPT]);
    }

    #[test]
    fn test_usbvm_devices_follow_admin_devices() {
        let set = candidates(UpdateMode::Update, true);
        let admin_count = set.adminvm.len();
        let answer = (admin_count + 1).to_string();
        let mut op = Scripted::new(&[answer.as_str()]);
        match select(&set, &mut op).unwrap() {
            SelectionOutcome::Selected(result) => {
                assert_eq!(result.domain, Domain::UsbVm);
                assert_eq!(result.device_index, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_answers_reprompt() {
        let set = candidates(UpdateMode::Update, false);
        let mut op = Scripted::new(&["0", "abc", "99", "1"]);
        assert!(matches!(select(&set, &mut op).unwrap(), SelectionOutcome::Selected(_)));
        assert_eq!(op.invalid, 3);
        assert_eq!(op.prompts.len(), 4);
    }

    #[test]
    fn test_abandon() {
        let set = candidates(UpdateMode::Update, false);
        for answers in [&["N"][..], &["n"][..], &[][..], &["x", "n"][..]] {
            let mut op = Scripted::new(answers);
            assert_eq!(select(&set, &mut op).unwrap(), SelectionOutcome::Abandoned);
        }
    }

    #[test]
    fn test_empty_set() {
        let set = UpdateCandidateSet::build(UpdateMode::Update, Vec::new(), None);
        let mut op = Scripted::new(&["1"]);
        assert_eq!(select(&set, &mut op).unwrap(), SelectionOutcome::NoCandidates);
        assert!(op.prompts.is_empty());
    }

    #[test]
    fn test_downgrade_selection() {
        let set = candidates(UpdateMode::Downgrade, false);
        let mut op = Scripted::new(&["1", "3", "2"]);
        let outcome = select(&set, &mut op).unwrap();
        assert_eq!(
            outcome,
            SelectionOutcome::Selected(SelectionResult {
                domain: Domain::AdminVm,
                device_index: 0,
                release_index: Some(1),
            })
        );
        assert_eq!(op.releases_shown, 1);
        assert_eq!(op.invalid, 1);
        assert_eq!(op.prompts, vec![DEVICE_PROMPT, RELEASE_PROMPT, RELEASE_PROMPT]);

        let target = set
            .target(&match outcome {
                SelectionOutcome::Selected(r) => r,
                _ => unreachable!(),
            })
            .unwrap();
        assert_eq!(target.release.version.as_str(), "2.0.2");
    }

    #[test]
    fn test_downgrade_abandon_at_release_prompt() {
        let set = candidates(UpdateMode::Downgrade, false);
        let mut op = Scripted::new(&["1", "N"]);
        assert_eq!(select(&set, &mut op).unwrap(), SelectionOutcome::Abandoned);
    }
}
