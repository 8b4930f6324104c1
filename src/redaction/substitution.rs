//! Substitution engine.
//!
//! Maps each final span to a [`Substitution`] and applies it to the
//! document text. Every generated value is recorded in the session's
//! [`IdentityStore`](super::identity::IdentityStore), so one original value
//! of one type yields exactly one substitute for the whole session.

use super::dates::{shift_date, synthetic_birth_date};
use super::generate::{self, infer_gender};
use super::identity::{Identity, IdentityAttributes, Session};
use crate::config::SubstitutionConfig;
use crate::domain::{EntityType, IdentityGroups, Span, TextIndex};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What happens to the text of one span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Substitution {
    /// The span keeps its original text.
    Unchanged,
    /// The span's text is replaced.
    Replaced(String),
    /// The span's text is removed.
    Erased,
}

impl Substitution {
    /// The text that ends up in the output for a span covering `original`.
    pub fn output<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            Self::Unchanged => original,
            Self::Replaced(text) => text,
            Self::Erased => "",
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// A span together with the substitution chosen for it.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedSubstitution {
    pub span: Span,
    pub original: String,
    pub substitution: Substitution,
}

/// Output of [`SubstitutionEngine::anonymize`].
#[derive(Debug, Clone, Default)]
pub struct Anonymized {
    pub text: String,
    /// One entry per processed span, in ascending start order.
    pub applied: Vec<AppliedSubstitution>,
}

fn digit_run() -> &'static Regex {
    static PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("Valid regex"));
    &PATTERN
}

/// Chooses substitutes per entity type.
#[derive(Debug, Clone)]
pub struct SubstitutionEngine {
    config: SubstitutionConfig,
    age_ceiling: u32,
}

impl SubstitutionEngine {
    pub fn new(config: &SubstitutionConfig, age_ceiling: u32) -> Self {
        Self {
            config: config.clone(),
            age_ceiling,
        }
    }

    /// Looks up or creates the identity for an original value.
    ///
    /// `original` should already be canonical: the group key for persons,
    /// the date key for date shifts, the raw text otherwise.
    pub fn get_or_create_identity<'s>(
        &self,
        session: &'s mut Session,
        original: &str,
        entity_type: &EntityType,
    ) -> &'s Identity {
        let Session { store, rng, .. } = session;
        store.get_or_create_with(original, entity_type, || match entity_type {
            EntityType::Person => {
                let gender = infer_gender(original);
                let (name, first, last) = generate::person_name(rng, gender);
                IdentityAttributes::Person {
                    gender,
                    name,
                    first,
                    last,
                }
            }
            EntityType::Location => IdentityAttributes::Location {
                city: generate::city(rng),
                state: generate::state_abbr(rng),
            },
            EntityType::DateTime | EntityType::Dob => IdentityAttributes::DateShift {
                days: rand::Rng::random_range(
                    rng,
                    self.config.shift_min_days..=self.config.shift_max_days,
                ),
            },
            other => IdentityAttributes::Value {
                value: self.generate_value(rng, original, other),
            },
        })
    }

    fn generate_value(&self, rng: &mut rand::rngs::StdRng, original: &str, entity_type: &EntityType) -> String {
        match entity_type {
            EntityType::Address => generate::street_address(rng),
            EntityType::Organization => generate::company(rng),
            EntityType::PhoneNumber => generate::phone(rng),
            EntityType::Email => generate::email(rng),
            EntityType::ZipCode => generate::zipcode(rng),
            EntityType::Url => generate::url(rng),
            EntityType::Mrn | EntityType::Id => match digit_run().find(original) {
                Some(run) => format!(
                    "{}{}{}",
                    &original[..run.start()],
                    generate::digits(rng, run.as_str().len()),
                    &original[run.end()..]
                ),
                None if *entity_type == EntityType::Mrn => {
                    format!("MRN: {}", generate::digits(rng, 8))
                }
                None => generate::digits(rng, 8),
            },
            _ => self.mask(original),
        }
    }

    /// Masks every alphanumeric character after an optional label ending
    /// in ':' or '#', keeping separators.
    pub fn mask(&self, text: &str) -> String {
        let label_end = text.rfind(|c: char| c == ':' || c == '#').map(|i| i + 1).unwrap_or(0);
        let (label, value) = text.split_at(label_end);
        let masked: String = value
            .chars()
            .map(|c| if c.is_alphanumeric() { self.config.mask_char } else { c })
            .collect();
        format!("{label}{masked}")
    }

    /// Decides the substitution for one span of `text`.
    pub fn substitute(
        &self,
        session: &mut Session,
        entity_type: &EntityType,
        text: &str,
        groups: &IdentityGroups,
    ) -> Substitution {
        match entity_type {
            EntityType::Person => {
                let key = groups.canonical_key(text);
                match &self.get_or_create_identity(session, &key, entity_type).attributes {
                    IdentityAttributes::Person { name, .. } => Substitution::Replaced(name.clone()),
                    _ => Substitution::Erased,
                }
            }
            EntityType::Location => {
                let key = text.trim().to_string();
                match &self.get_or_create_identity(session, &key, entity_type).attributes {
                    IdentityAttributes::Location { city, .. } => Substitution::Replaced(city.clone()),
                    _ => Substitution::Erased,
                }
            }
            temporal if temporal.is_temporal() => self.substitute_date(session, entity_type, text),
            EntityType::Ssn | EntityType::License | EntityType::BankNumber | EntityType::CreditCard => {
                Substitution::Replaced(self.mask(text))
            }
            EntityType::Age => self.substitute_age(text),
            EntityType::ReviewerFlag => Substitution::Replaced(self.config.block_marker.clone()),
            EntityType::Title | EntityType::Nrp | EntityType::Other(_) => Substitution::Unchanged,
            _ => self.stored_value(session, entity_type, text.trim()),
        }
    }

    fn stored_value(&self, session: &mut Session, entity_type: &EntityType, key: &str) -> Substitution {
        match &self.get_or_create_identity(session, key, entity_type).attributes {
            IdentityAttributes::Value { value } => Substitution::Replaced(value.clone()),
            _ => {
                warn!(entity_type = %entity_type, "identity key collision; erasing span");
                Substitution::Erased
            }
        }
    }

    fn substitute_date(&self, session: &mut Session, entity_type: &EntityType, text: &str) -> Substitution {
        let date_key = session
            .date_key()
            .unwrap_or(&self.config.default_date_key)
            .to_string();
        let shift = match self
            .get_or_create_identity(session, &date_key, &EntityType::DateTime)
            .attributes
        {
            IdentityAttributes::DateShift { days } => days,
            _ => self.config.shift_min_days,
        };

        match shift_date(text, shift, &self.config.date_formats) {
            Some(shifted) => Substitution::Replaced(shifted),
            None => {
                debug!(entity_type = %entity_type, "date not parseable; using a synthetic date");
                Substitution::Replaced(self.synthetic_date(session, text.trim()))
            }
        }
    }

    /// A stable synthetic date for text no configured format parses. Stored
    /// under the DOB type so it never collides with the date-shift record.
    fn synthetic_date(&self, session: &mut Session, key: &str) -> String {
        let Session { store, rng, .. } = session;
        let make = |rng: &mut rand::rngs::StdRng| {
            synthetic_birth_date(
                rng,
                chrono::Utc::now().date_naive(),
                self.config.fallback_min_age,
                self.config.fallback_max_age,
                &self.config.fallback_date_format,
            )
        };
        let identity = store.get_or_create_with(key, &EntityType::Dob, || IdentityAttributes::Value {
            value: make(&mut *rng),
        });
        match &identity.attributes {
            IdentityAttributes::Value { value } => value.clone(),
            _ => make(rng),
        }
    }

    fn substitute_age(&self, text: &str) -> Substitution {
        let age = digit_run()
            .find(text)
            .and_then(|m| m.as_str().parse::<u32>().ok());
        match age {
            Some(age) if age >= self.age_ceiling => {
                Substitution::Replaced(format!("{}+", self.age_ceiling))
            }
            Some(_) => Substitution::Unchanged,
            None => {
                debug!("age without digits left unchanged");
                Substitution::Unchanged
            }
        }
    }

    /// Applies substitutions for non-overlapping `spans` to `text`.
    ///
    /// Spans are processed in descending start order so earlier offsets
    /// stay valid as the text changes length. A span overlapping one
    /// already applied is skipped with a warning.
    pub fn anonymize(
        &self,
        session: &mut Session,
        text: &str,
        spans: &[Span],
        groups: &IdentityGroups,
    ) -> Anonymized {
        let index = TextIndex::new(text);
        let mut ordered: Vec<&Span> = spans.iter().collect();
        ordered.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

        let mut output = text.to_string();
        let mut applied = Vec::with_capacity(ordered.len());
        let mut floor = usize::MAX;

        for span in ordered {
            if span.end > floor || span.end > index.char_len() {
                warn!(start = span.start, end = span.end, "skipping overlapping span");
                continue;
            }
            floor = span.start;

            let original = index.span_text(span);
            let substitution = self.substitute(session, &span.entity_type, original, groups);
            if substitution.is_change() {
                let range = index.byte_offset(span.start)..index.byte_offset(span.end);
                output.replace_range(range, substitution.output(original));
            }
            applied.push(AppliedSubstitution {
                span: span.clone(),
                original: original.to_string(),
                substitution,
            });
        }

        applied.reverse();
        Anonymized {
            text: output,
            applied,
        }
    }
}
