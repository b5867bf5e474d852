//! Syntactic complexity from dependency parses.
//!
//! Consumes the parsing capability's output: one [`ParsedToken`] per token, with its
//! dependency head, Universal POS tag, Penn fine-grained tag and morphology string
//! (`Key=Value|Key=Value`). Tense buckets are evaluated independently, so a verb may
//! count toward more than one of them and the three ratios need not sum to 1.

use serde::{Deserialize, Serialize};

/// Universal Dependencies coarse part-of-speech tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartOfSpeech {
    Adj,
    Adp,
    Adv,
    Aux,
    Cconj,
    Det,
    Intj,
    Noun,
    Num,
    Part,
    Pron,
    Propn,
    Punct,
    Sconj,
    Sym,
    Verb,
    #[serde(other)]
    X,
}

const PRESENT_TAGS: [&str; 3] = ["VBP", "VBZ", "VBG"];
const PAST_TAGS: [&str; 2] = ["VBD", "VBN"];
const MODAL_TAG: &str = "MD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedToken {
    pub index: usize,
    pub head: usize,
    pub dep: String,
    pub pos: PartOfSpeech,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub morph: String,
}

impl ParsedToken {
    pub fn is_root(&self) -> bool {
        self.dep.eq_ignore_ascii_case("root")
    }

    /// True when the morphology string contains `feature` (e.g. `Tense=Past`).
    pub fn has_morph(&self, feature: &str) -> bool {
        self.morph.split('|').any(|f| f.trim() == feature)
    }

    fn is_verb_like(&self) -> bool {
        matches!(self.pos, PartOfSpeech::Verb | PartOfSpeech::Aux) || self.tag == MODAL_TAG
    }

    fn is_present(&self) -> bool {
        self.has_morph("Tense=Pres") || PRESENT_TAGS.contains(&self.tag.as_str())
    }

    fn is_past(&self) -> bool {
        self.has_morph("Tense=Past") || PAST_TAGS.contains(&self.tag.as_str())
    }

    fn is_future(&self) -> bool {
        self.tag == MODAL_TAG || self.has_morph("Tense=Fut")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub tokens: Vec<ParsedToken>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SyntacticStats {
    pub avg_dependency_length: f64,
    pub pronoun_noun_ratio: f64,
    pub tense_ratio_present: f64,
    pub tense_ratio_past: f64,
    pub tense_ratio_future: f64,
}

impl SyntacticStats {
    /// Statistics of a parse; `None` (no document) yields all zeros.
    pub fn compute(doc: Option<&ParsedDocument>) -> Self {
        let doc = match doc {
            Some(d) if !d.tokens.is_empty() => d,
            _ => return Self::default(),
        };

        let (pronouns, nouns) = doc.tokens.iter().fold((0usize, 0usize), |(p, n), t| match t.pos {
            PartOfSpeech::Pron => (p + 1, n),
            PartOfSpeech::Noun => (p, n + 1),
            _ => (p, n),
        });

        let verbs: Vec<&ParsedToken> = doc.tokens.iter().filter(|t| t.is_verb_like()).collect();
        let count = |pred: fn(&ParsedToken) -> bool| verbs.iter().filter(|t| pred(t)).count();

        Self {
            avg_dependency_length: avg_dependency_length(doc),
            pronoun_noun_ratio: crate::lexical::ratio(pronouns, nouns),
            tense_ratio_present: crate::lexical::ratio(count(ParsedToken::is_present), verbs.len()),
            tense_ratio_past: crate::lexical::ratio(count(ParsedToken::is_past), verbs.len()),
            tense_ratio_future: crate::lexical::ratio(count(ParsedToken::is_future), verbs.len()),
        }
    }
}

/// Mean |index - head| over non-root tokens.
pub fn avg_dependency_length(doc: &ParsedDocument) -> f64 {
    let lengths: Vec<usize> = doc
        .tokens
        .iter()
        .filter(|t| !t.is_root())
        .map(|t| t.index.abs_diff(t.head))
        .collect();
    if lengths.is_empty() {
        0.0
    } else {
        lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
    }
}
