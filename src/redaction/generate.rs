//! Synthetic value generation.
//!
//! Every generator draws from the session RNG so a seeded session is fully
//! reproducible. Email and web addresses use reserved example domains.

use rand::Rng;
use serde::{Deserialize, Serialize};

const MALE_FIRST: &[&str] = &[
    "James", "Robert", "Michael", "William", "David", "Richard", "Joseph", "Thomas", "Charles",
    "Daniel", "Matthew", "Anthony", "Mark", "Paul", "Steven", "Andrew", "Kenneth", "Carlos",
    "Luis", "Miguel", "Diego", "Jorge", "Wei", "Ming", "Samuel", "Henry",
];

const FEMALE_FIRST: &[&str] = &[
    "Mary", "Patricia", "Jennifer", "Linda", "Barbara", "Elizabeth", "Susan", "Jessica", "Sarah",
    "Karen", "Nancy", "Margaret", "Sandra", "Ashley", "Dorothy", "Kimberly", "Emily", "Donna",
    "Michelle", "Maria", "Ana", "Rosa", "Carmen", "Isabel", "Sofia", "Gabriela", "Laura",
];

const LAST: &[&str] = &[
    "Anderson", "Bennett", "Carter", "Delgado", "Ellison", "Fischer", "Garcia", "Hayes", "Ibarra",
    "Jensen", "Kowalski", "Lindqvist", "Morales", "Nguyen", "Okafor", "Patel", "Quinn", "Romero",
    "Sullivan", "Tanaka", "Underwood", "Vasquez", "Whitaker", "Xu", "Yilmaz", "Zimmerman",
];

const CITIES: &[&str] = &[
    "Millbrook", "Fairhaven", "Cedar Falls", "Riverton", "Ashford", "Lakewood", "Brookside",
    "Harborview", "Maple Grove", "Westfield", "Northgate", "Pine Ridge", "Stonebridge",
    "Clearwater", "Oakdale", "Silverton", "Greenville", "Elmhurst", "Bayport", "Summit Hill",
];

const STATES: &[&str] = &[
    "AL", "AZ", "CA", "CO", "FL", "GA", "IL", "IN", "KY", "MA", "MI", "MN", "MO", "NC", "NJ", "NY",
    "OH", "OR", "PA", "TN", "TX", "VA", "WA", "WI",
];

const STREETS: &[&str] = &[
    "Oak", "Maple", "Cedar", "Elm", "Willow", "Birch", "Lakeview", "Hillcrest", "Sunset",
    "Park", "Meadow", "River", "Highland", "Chestnut", "Spruce", "Orchard",
];

const STREET_SUFFIXES: &[&str] = &["St", "Ave", "Rd", "Ln", "Dr", "Ct", "Blvd", "Way"];

const COMPANY_WORDS: &[&str] = &[
    "Summit", "Keystone", "Bluewater", "Northstar", "Evergreen", "Pinnacle", "Harbor", "Crescent",
    "Liberty", "Meridian", "Granite", "Beacon",
];

const COMPANY_SUFFIXES: &[&str] = &[
    "Health Partners",
    "Medical Group",
    "Associates",
    "Clinic",
    "Holdings",
    "LLC",
    "Group",
    "Care Center",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

/// Gender inferred for a person identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

const KNOWN_MALE: &[&str] = &[
    "john", "james", "robert", "michael", "william", "david", "richard", "joseph", "thomas",
    "charles", "christopher", "daniel", "matthew", "anthony", "donald", "mark", "paul", "steven",
    "andrew", "kenneth", "carlos", "jose", "juan", "luis", "miguel", "diego", "jorge", "chen",
    "wei", "wang", "li", "ming",
];

const KNOWN_FEMALE: &[&str] = &[
    "mary", "patricia", "jennifer", "linda", "barbara", "elizabeth", "susan", "jessica", "sarah",
    "karen", "nancy", "betty", "margaret", "sandra", "ashley", "dorothy", "kimberly", "emily",
    "donna", "michelle", "maria", "ana", "rosa", "carmen", "isabel", "sofia", "gabriela", "lisa",
    "laura", "angela",
];

/// Infers gender from a name's first word, then from honorifics.
///
/// ```
/// use phi_redactor::redaction::generate::{infer_gender, Gender};
///
/// assert_eq!(infer_gender("Jon Smith"), Gender::Male);
/// assert_eq!(infer_gender("liz"), Gender::Female);
/// assert_eq!(infer_gender("Mrs. Okafor"), Gender::Female);
/// assert_eq!(infer_gender("Pat"), Gender::Unknown);
/// ```
pub fn infer_gender(name: &str) -> Gender {
    let Some(first) = name.split_whitespace().next() else {
        return Gender::Unknown;
    };

    let first = first.trim_end_matches('.').to_lowercase();
    let first = match first.as_str() {
        "jhon" | "jon" => "john",
        "mike" | "mick" => "michael",
        "bob" | "bobby" => "robert",
        "sue" | "susie" => "susan",
        "liz" | "beth" => "elizabeth",
        "jen" | "jenny" => "jennifer",
        other => other,
    };

    if KNOWN_MALE.contains(&first) {
        return Gender::Male;
    }
    if KNOWN_FEMALE.contains(&first) {
        return Gender::Female;
    }

    match first {
        "mr" | "sir" => Gender::Male,
        "ms" | "mrs" | "miss" | "madam" => Gender::Female,
        _ => Gender::Unknown,
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, items: &[&'static str]) -> &'static str {
    items[rng.random_range(0..items.len())]
}

/// A full name drawn from the pool matching `gender`: `(full, first, last)`.
pub fn person_name<R: Rng + ?Sized>(rng: &mut R, gender: Gender) -> (String, String, String) {
    let first = match gender {
        Gender::Male => pick(rng, MALE_FIRST),
        Gender::Female => pick(rng, FEMALE_FIRST),
        Gender::Unknown if rng.random_bool(0.5) => pick(rng, MALE_FIRST),
        Gender::Unknown => pick(rng, FEMALE_FIRST),
    };
    let last = pick(rng, LAST);
    (format!("{first} {last}"), first.to_string(), last.to_string())
}

pub fn city<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(rng, CITIES).to_string()
}

pub fn state_abbr<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(rng, STATES).to_string()
}

pub fn zipcode<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:05}", rng.random_range(10_000..=99_999))
}

pub fn street_address<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{} {} {}, {}, {} {}",
        rng.random_range(10..=9_999),
        pick(rng, STREETS),
        pick(rng, STREET_SUFFIXES),
        pick(rng, CITIES),
        pick(rng, STATES),
        zipcode(rng)
    )
}

pub fn company<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{} {}", pick(rng, COMPANY_WORDS), pick(rng, COMPANY_SUFFIXES))
}

pub fn phone<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{}.{}.{}",
        rng.random_range(200..=999),
        rng.random_range(200..=999),
        rng.random_range(1_000..=9_999)
    )
}

pub fn email<R: Rng + ?Sized>(rng: &mut R) -> String {
    let (_, first, last) = person_name(rng, Gender::Unknown);
    format!(
        "{}.{}{}@{}",
        first.to_lowercase(),
        last.to_lowercase(),
        rng.random_range(1..=99),
        pick(rng, EMAIL_DOMAINS)
    )
}

pub fn url<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "https://www.{}/{}",
        pick(rng, EMAIL_DOMAINS),
        pick(rng, STREETS).to_lowercase()
    )
}

/// A string of `len` random decimal digits.
pub fn digits<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_gendered_names_use_matching_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let (_, first, _) = person_name(&mut rng, Gender::Female);
            assert!(FEMALE_FIRST.contains(&first.as_str()));
            let (_, first, _) = person_name(&mut rng, Gender::Male);
            assert!(MALE_FIRST.contains(&first.as_str()));
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(street_address(&mut a), street_address(&mut b));
        assert_eq!(email(&mut a), email(&mut b));
    }

    #[test]
    fn test_formats() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(zipcode(&mut rng).len(), 5);
        assert_eq!(digits(&mut rng, 9).len(), 9);
        assert!(digits(&mut rng, 9).chars().all(|c| c.is_ascii_digit()));
        assert_eq!(phone(&mut rng).split('.').count(), 3);
        assert!(email(&mut rng).contains("@example."));
    }
}
