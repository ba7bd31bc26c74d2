//! Password policy merging and password generation.
//!
//! Every policy applicable to a subject (global, per role, per resource) is
//! folded into one effective policy: the strictest value of every constraint
//! wins. A compliant password is then drawn from the operating system's
//! CSPRNG.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Special characters used for non-alphanumeric slots.
pub const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";

/// Maximum length used when no policy sets one.
pub const DEFAULT_MAX_LENGTH: u32 = 1000;

/// Policies that cannot be satisfied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidPolicyError {
    #[error("Minimum length must be greater than zero")]
    NonPositiveMinLength,

    #[error("Minimum length {min} is greater than maximum length {max}")]
    MinGreaterThanMax { min: u32, max: u32 },

    #[error("Conflicting constraints: {first} and {second}")]
    ConflictingFlags {
        first: &'static str,
        second: &'static str,
    },

    #[error("Unsatisfiable policy: {reason}")]
    Unsatisfiable { reason: String },
}

/// A password policy specification.
///
/// A length of zero means "not set". "Alpha" means a letter; "non-alpha"
/// means a special character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicySpec {
    pub min_length: u32,
    pub max_length: u32,

    pub digit_required: bool,
    pub uppercase_required: bool,
    pub lowercase_required: bool,
    pub non_alphanumeric_required: bool,

    pub must_start_with_alpha: bool,
    pub must_start_with_digit: bool,
    pub must_start_with_non_alpha: bool,
    pub mustnt_start_with_alpha: bool,
    pub mustnt_start_with_digit: bool,
    pub mustnt_start_with_non_alpha: bool,

    pub must_end_with_alpha: bool,
    pub must_end_with_digit: bool,
    pub must_end_with_non_alpha: bool,
    pub mustnt_end_with_alpha: bool,
    pub mustnt_end_with_digit: bool,
    pub mustnt_end_with_non_alpha: bool,

    pub forbidden_prefixes: Vec<String>,
    pub forbidden_suffixes: Vec<String>,
}

impl PasswordPolicySpec {
    /// Fold specs into the effective one: largest minimum, smallest non-zero
    /// maximum, union of forbidden affixes, OR of every flag.
    #[must_use]
    pub fn merge(specs: &[PasswordPolicySpec]) -> PasswordPolicySpec {
        let mut merged = PasswordPolicySpec {
            max_length: DEFAULT_MAX_LENGTH,
            ..Default::default()
        };
        let mut max_set = false;

        for spec in specs {
            merged.min_length = merged.min_length.max(spec.min_length);
            if spec.max_length > 0 {
                merged.max_length = if max_set {
                    merged.max_length.min(spec.max_length)
                } else {
                    spec.max_length
                };
                max_set = true;
            }

            merged.digit_required |= spec.digit_required;
            merged.uppercase_required |= spec.uppercase_required;
            merged.lowercase_required |= spec.lowercase_required;
            merged.non_alphanumeric_required |= spec.non_alphanumeric_required;

            merged.must_start_with_alpha |= spec.must_start_with_alpha;
            merged.must_start_with_digit |= spec.must_start_with_digit;
            merged.must_start_with_non_alpha |= spec.must_start_with_non_alpha;
            merged.mustnt_start_with_alpha |= spec.mustnt_start_with_alpha;
            merged.mustnt_start_with_digit |= spec.mustnt_start_with_digit;
            merged.mustnt_start_with_non_alpha |= spec.mustnt_start_with_non_alpha;

            merged.must_end_with_alpha |= spec.must_end_with_alpha;
            merged.must_end_with_digit |= spec.must_end_with_digit;
            merged.must_end_with_non_alpha |= spec.must_end_with_non_alpha;
            merged.mustnt_end_with_alpha |= spec.mustnt_end_with_alpha;
            merged.mustnt_end_with_digit |= spec.mustnt_end_with_digit;
            merged.mustnt_end_with_non_alpha |= spec.mustnt_end_with_non_alpha;

            union_into(&mut merged.forbidden_prefixes, &spec.forbidden_prefixes);
            union_into(&mut merged.forbidden_suffixes, &spec.forbidden_suffixes);
        }
        merged
    }

    /// Reject policies no password can satisfy, before any generation.
    pub fn check(&self) -> Result<(), InvalidPolicyError> {
        if self.min_length == 0 {
            return Err(InvalidPolicyError::NonPositiveMinLength);
        }
        if self.min_length > self.max_length {
            return Err(InvalidPolicyError::MinGreaterThanMax {
                min: self.min_length,
                max: self.max_length,
            });
        }

        let conflicts = [
            (self.must_end_with_alpha && self.mustnt_end_with_alpha, "must_end_with_alpha", "mustnt_end_with_alpha"),
            (self.must_end_with_alpha && self.must_end_with_digit, "must_end_with_alpha", "must_end_with_digit"),
            (self.must_end_with_digit && self.mustnt_end_with_digit, "must_end_with_digit", "mustnt_end_with_digit"),
            (self.must_end_with_non_alpha && self.mustnt_end_with_non_alpha, "must_end_with_non_alpha", "mustnt_end_with_non_alpha"),
            (self.must_start_with_alpha && self.mustnt_start_with_alpha, "must_start_with_alpha", "mustnt_start_with_alpha"),
            (self.must_start_with_alpha && self.must_start_with_digit, "must_start_with_alpha", "must_start_with_digit"),
            (self.must_start_with_digit && self.mustnt_start_with_digit, "must_start_with_digit", "mustnt_start_with_digit"),
            (self.must_start_with_non_alpha && self.mustnt_start_with_non_alpha, "must_start_with_non_alpha", "mustnt_start_with_non_alpha"),
        ];
        match conflicts.iter().find(|(conflict, _, _)| *conflict) {
            Some(&(_, first, second)) => Err(InvalidPolicyError::ConflictingFlags { first, second }),
            None => Ok(()),
        }
    }

    /// Whether `password` satisfies every constraint of this policy.
    #[must_use]
    pub fn complies(&self, password: &str) -> bool {
        let length = password.chars().count() as u32;
        if length < self.min_length || (self.max_length > 0 && length > self.max_length) {
            return false;
        }

        let classes: Vec<CharClass> = password.chars().filter_map(CharClass::of).collect();
        let has = |class: CharClass| classes.contains(&class);
        if (self.digit_required && !has(CharClass::Digit))
            || (self.uppercase_required && !has(CharClass::Upper))
            || (self.lowercase_required && !has(CharClass::Lower))
            || (self.non_alphanumeric_required && !has(CharClass::Special))
        {
            return false;
        }

        let positional_ok = |class: Option<&CharClass>, allowed: Option<Vec<CharClass>>| {
            match (class, allowed) {
                (_, None) => true,
                (Some(c), Some(allowed)) => allowed.contains(c),
                (None, Some(_)) => false,
            }
        };
        if !positional_ok(classes.first(), self.allowed_start())
            || !positional_ok(classes.last(), self.allowed_end())
        {
            return false;
        }

        !self
            .forbidden_prefixes
            .iter()
            .any(|p| password.starts_with(p.as_str()))
            && !self
                .forbidden_suffixes
                .iter()
                .any(|s| password.ends_with(s.as_str()))
    }

    fn required_classes(&self) -> Vec<CharClass> {
        [
            (self.digit_required, CharClass::Digit),
            (self.uppercase_required, CharClass::Upper),
            (self.lowercase_required, CharClass::Lower),
            (self.non_alphanumeric_required, CharClass::Special),
        ]
        .into_iter()
        .filter_map(|(required, class)| required.then_some(class))
        .collect()
    }

    /// Classes allowed in the first slot; `None` when unconstrained.
    fn allowed_start(&self) -> Option<Vec<CharClass>> {
        positional_classes(
            [
                self.must_start_with_alpha,
                self.must_start_with_digit,
                self.must_start_with_non_alpha,
            ],
            [
                self.mustnt_start_with_alpha,
                self.mustnt_start_with_digit,
                self.mustnt_start_with_non_alpha,
            ],
        )
    }

    /// Classes allowed in the last slot; `None` when unconstrained.
    fn allowed_end(&self) -> Option<Vec<CharClass>> {
        positional_classes(
            [
                self.must_end_with_alpha,
                self.must_end_with_digit,
                self.must_end_with_non_alpha,
            ],
            [
                self.mustnt_end_with_alpha,
                self.mustnt_end_with_digit,
                self.mustnt_end_with_non_alpha,
            ],
        )
    }
}

fn union_into(target: &mut Vec<String>, source: &[String]) {
    for value in source {
        if !value.is_empty() && !target.contains(value) {
            target.push(value.clone());
        }
    }
}

/// Character class of one password slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Upper,
    Lower,
    Digit,
    Special,
}

impl CharClass {
    const ALL: [CharClass; 4] = [
        CharClass::Upper,
        CharClass::Lower,
        CharClass::Digit,
        CharClass::Special,
    ];

    fn of(c: char) -> Option<CharClass> {
        if c.is_ascii_uppercase() {
            Some(CharClass::Upper)
        } else if c.is_ascii_lowercase() {
            Some(CharClass::Lower)
        } else if c.is_ascii_digit() {
            Some(CharClass::Digit)
        } else if SPECIAL_CHARS.contains(c) {
            Some(CharClass::Special)
        } else {
            None
        }
    }

    fn alphabet(self) -> &'static [u8] {
        match self {
            CharClass::Upper => UPPERCASE.as_bytes(),
            CharClass::Lower => LOWERCASE.as_bytes(),
            CharClass::Digit => DIGITS.as_bytes(),
            CharClass::Special => SPECIAL_CHARS.as_bytes(),
        }
    }

    /// Index into the alpha/digit/non-alpha positional flag triples.
    fn positional_index(self) -> usize {
        match self {
            CharClass::Upper | CharClass::Lower => 0,
            CharClass::Digit => 1,
            CharClass::Special => 2,
        }
    }

    fn draw<R: Rng + ?Sized>(self, rng: &mut R) -> char {
        let alphabet = self.alphabet();
        char::from(alphabet[rng.gen_range(0..alphabet.len())])
    }
}

fn positional_classes(must: [bool; 3], mustnt: [bool; 3]) -> Option<Vec<CharClass>> {
    if !must.iter().chain(mustnt.iter()).any(|f| *f) {
        return None;
    }
    let any_must = must.iter().any(|f| *f);
    Some(
        CharClass::ALL
            .into_iter()
            .filter(|class| {
                let i = class.positional_index();
                (!any_must || must[i]) && !mustnt[i]
            })
            .collect(),
    )
}

fn intersect(left: Option<Vec<CharClass>>, right: Option<Vec<CharClass>>) -> Option<Vec<CharClass>> {
    match (left, right) {
        (None, other) | (other, None) => other,
        (Some(l), Some(r)) => Some(l.into_iter().filter(|c| r.contains(c)).collect()),
    }
}

/// Prefer a still-pending required class, otherwise any allowed one.
fn pick_class<R: Rng + ?Sized>(allowed: &[CharClass], pending: &[CharClass], rng: &mut R) -> CharClass {
    if let Some(class) = allowed.iter().find(|c| pending.contains(c)) {
        return *class;
    }
    allowed[rng.gen_range(0..allowed.len())]
}

fn random_letter<R: Rng + ?Sized>(rng: &mut R) -> CharClass {
    if rng.gen_bool(0.5) {
        CharClass::Upper
    } else {
        CharClass::Lower
    }
}

/// Generates passwords compliant with merged policies.
#[derive(Debug, Clone)]
pub struct PasswordSynthesizer {
    retries: u32,
}

impl Default for PasswordSynthesizer {
    fn default() -> Self {
        Self { retries: 64 }
    }
}

impl PasswordSynthesizer {
    /// `retries` bounds the forbidden prefix/suffix fix-up loop.
    #[must_use]
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }

    /// Merge `specs` and generate a compliant password.
    pub fn generate(&self, specs: &[PasswordPolicySpec]) -> Result<String, InvalidPolicyError> {
        let policy = PasswordPolicySpec::merge(specs);
        self.generate_for(&policy, &mut OsRng)
    }

    /// Generate a password for an already merged policy.
    fn generate_for<R: Rng + ?Sized>(
        &self,
        policy: &PasswordPolicySpec,
        rng: &mut R,
    ) -> Result<String, InvalidPolicyError> {
        policy.check()?;

        let length = policy.min_length as usize;
        let start = policy.allowed_start();
        let end = policy.allowed_end();
        let (start, end) = if length == 1 {
            (intersect(start, end), None)
        } else {
            (start, end)
        };

        let mut pending = policy.required_classes();
        let mut slots: Vec<Option<CharClass>> = vec![None; length];

        if let Some(allowed) = start {
            if allowed.is_empty() {
                return Err(unsatisfiable("no character class satisfies the start constraints"));
            }
            let class = pick_class(&allowed, &pending, rng);
            slots[0] = Some(class);
            pending.retain(|c| *c != class);
        }

        let end_fixed = end.is_some();
        if let Some(allowed) = end {
            if allowed.is_empty() {
                return Err(unsatisfiable("no character class satisfies the end constraints"));
            }
            let class = pick_class(&allowed, &pending, rng);
            slots[length - 1] = Some(class);
            pending.retain(|c| *c != class);
        }

        for class in pending {
            match slots.iter().position(Option::is_none) {
                Some(i) => slots[i] = Some(class),
                None if slots.len() < policy.max_length as usize => {
                    // Keep a constrained last slot last.
                    let at = if end_fixed { slots.len() - 1 } else { slots.len() };
                    slots.insert(at, Some(class));
                }
                None => {
                    return Err(unsatisfiable(
                        "required character classes do not fit in the maximum length",
                    ))
                }
            }
        }

        let classes: Vec<CharClass> = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| random_letter(rng)))
            .collect();
        let mut password: Vec<char> = classes.iter().map(|c| c.draw(rng)).collect();

        for attempt in 0..=self.retries {
            let candidate: String = password.iter().collect();
            let bad_prefix = policy
                .forbidden_prefixes
                .iter()
                .any(|p| candidate.starts_with(p.as_str()));
            let bad_suffix = policy
                .forbidden_suffixes
                .iter()
                .any(|s| candidate.ends_with(s.as_str()));
            if !bad_prefix && !bad_suffix {
                return Ok(candidate);
            }
            debug!(attempt, bad_prefix, bad_suffix, "Regenerating forbidden password affix");
            if bad_prefix {
                password[0] = classes[0].draw(rng);
            }
            if bad_suffix {
                let last = password.len() - 1;
                password[last] = classes[last].draw(rng);
            }
        }

        Err(unsatisfiable("forbidden prefixes or suffixes could not be avoided"))
    }
}

fn unsatisfiable(reason: &str) -> InvalidPolicyError {
    InvalidPolicyError::Unsatisfiable {
        reason: reason.to_string(),
    }
}
