//! The twenty classic Magic 8-Ball answers

const ANSWERS: [&str; 20] = [
    "It is certain.",
    "It is decidedly so.",
    "Without a doubt.",
    "Yes, definitely.",
    "You may rely on it.",
    "As I see it, yes.",
    "Most likely.",
    "Outlook good.",
    "Yes.",
    "Signs point to yes.",
    "Reply hazy, try again.",
    "Ask again later.",
    "Better not tell you now.",
    "Cannot predict now.",
    "Concentrate and ask again.",
    "Don't count on it.",
    "My reply is no.",
    "My sources say no.",
    "Outlook not so good.",
    "Very doubtful.",
];

pub const COUNT: usize = ANSWERS.len();

pub fn all() -> &'static [&'static str] {
    &ANSWERS
}

pub fn get(index: usize) -> Option<&'static str> {
    ANSWERS.get(index).copied()
}

/// Localization key for an answer, `SLUG-ANSWER-00` through `SLUG-ANSWER-19`
pub fn slug(index: usize) -> Option<String> {
    (index < COUNT).then(|| format!("SLUG-ANSWER-{:02}", index))
}

pub fn random() -> &'static str {
    ANSWERS[fastrand::usize(..COUNT)]
}

/// Pick an answer from a caller-owned generator, for reproducible runs
pub fn random_with(rng: &mut fastrand::Rng) -> &'static str {
    ANSWERS[rng.usize(..COUNT)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_shape() {
        assert_eq!(all().len(), 20);
        assert_eq!(get(7), Some("Outlook good."));
        assert_eq!(get(20), None);
        assert_eq!(slug(3).as_deref(), Some("SLUG-ANSWER-03"));
        assert_eq!(slug(20), None);
    }

    #[test]
    fn test_random_comes_from_catalogue() {
        let mut rng = fastrand::Rng::with_seed(42);
        for _ in 0..50 {
            assert!(all().contains(&random()));
            assert!(all().contains(&random_with(&mut rng)));
        }
    }
}
