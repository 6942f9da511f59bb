//! The fixed probe corpus.
//!
//! Fifty short sentences, each chosen to exercise one linguistic phenomenon.
//! The order is significant: profile columns are laid out sentence by
//! sentence in this order.

use serde::Serialize;

/// A probe sentence and the phenomenon it exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeSentence {
    pub phenomenon: &'static str,
    pub text: &'static str,
}

const fn probe(phenomenon: &'static str, text: &'static str) -> ProbeSentence {
    ProbeSentence { phenomenon, text }
}

pub const PROBE_SENTENCES: [ProbeSentence; 50] = [
    probe("agreement", "The cat sits on the mat."),
    probe("agreement", "The cats sit on the mat."),
    probe("agreement", "She sells seashells by the seashore."),
    probe("coreference", "The animal didn't cross the street because it was too tired."),
    probe("coreference", "The street was blocked because it was under construction."),
    probe("coreference", "John gave Mary a book. She thanked him."),
    probe("negation", "I do not like green eggs and ham."),
    probe("negation", "She never goes to the park."),
    probe("negation", "Nobody knows the trouble I've seen."),
    probe("question", "What is the meaning of life?"),
    probe("question", "Where did you go yesterday?"),
    probe("question", "How does a transformer work?"),
    probe("passive", "The ball was thrown by the boy."),
    probe("passive", "The cake was eaten by the children."),
    probe("passive", "The letter was written by my grandmother."),
    probe("relative_clause", "The book that I read was interesting."),
    probe("relative_clause", "The person who called didn't leave a message."),
    probe("relative_clause", "The house where I grew up was sold."),
    probe("conjunction", "I like apples and oranges."),
    probe("conjunction", "She is smart but lazy."),
    probe("conjunction", "You can have tea or coffee."),
    probe("prepositional", "The cat under the table is sleeping."),
    probe("prepositional", "We walked through the forest."),
    probe("prepositional", "She arrived before noon."),
    probe("comparative", "This is better than that."),
    probe("comparative", "She is taller than her brother."),
    probe("comparative", "The fastest runner won the race."),
    probe("temporal", "Yesterday I went to the store."),
    probe("temporal", "Tomorrow will be sunny."),
    probe("temporal", "I have been waiting for hours."),
    probe("causation", "Because it rained, the game was cancelled."),
    probe("causation", "The plant died from lack of water."),
    probe("causation", "He was late because the train broke down."),
    probe("conditional", "If it rains, we will stay inside."),
    probe("conditional", "I would go if I had time."),
    probe("modal", "You should eat your vegetables."),
    probe("modal", "She might come to the party."),
    probe("modal", "We must finish this today."),
    probe("possession", "This is John's book."),
    probe("possession", "The dog's tail wagged."),
    probe("possession", "The children's toys were everywhere."),
    probe("quantity", "I have three apples."),
    probe("quantity", "There are many people here."),
    probe("quantity", "She bought a few items."),
    probe("idiom", "It's raining cats and dogs."),
    probe("idiom", "Break a leg!"),
    probe("idiom", "The ball is in your court."),
    probe("technical", "The mitochondria is the powerhouse of the cell."),
    probe("technical", "Quantum mechanics describes subatomic particles."),
    probe("technical", "Machine learning models learn from data."),
];

/// Ordered, immutable list of probe sentences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    sentences: Vec<String>,
}

impl Default for Corpus {
    fn default() -> Self {
        Self::standard()
    }
}

impl Corpus {
    /// The built-in 50-sentence probe corpus.
    pub fn standard() -> Self {
        Self {
            sentences: PROBE_SENTENCES.iter().map(|p| p.text.to_string()).collect(),
        }
    }

    /// A custom corpus. Used for calibration runs and tests.
    pub fn from_sentences<I, S>(sentences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sentences: sentences.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// The first `n` sentences (or all of them when the corpus is shorter).
    pub fn sample(&self, n: usize) -> &[String] {
        &self.sentences[..n.min(self.sentences.len())]
    }
}
