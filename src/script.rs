//! Scripts the performer reads from.

use std::fs;
use std::io;
use std::path::Path;

pub const CUSTOM_TITLE: &str = "Custom Script";
const EXCERPT_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub title: String,
    pub author: String,
    pub text: String,
}

impl Script {
    pub fn new(title: impl Into<String>, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            text: text.into(),
        }
    }

    /// A script typed in by the user. Blank input is refused.
    pub fn custom(text: &str) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }
        Some(Self::new(CUSTOM_TITLE, "You", text))
    }

    /// Read a script from a text file; the title defaults to the file stem.
    pub fn from_file(path: &Path, title: Option<&str>) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        let title = title
            .map(str::to_owned)
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| CUSTOM_TITLE.to_owned());
        Ok(Self::new(title, "You", text))
    }

    /// First 60 characters followed by an ellipsis.
    pub fn excerpt(&self) -> String {
        let head: String = self.text.chars().take(EXCERPT_CHARS).collect();
        format!("{head}...")
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::new(
            "The Gettysburg Address",
            "Abraham Lincoln",
            "Four score and seven years ago our fathers brought forth on this continent, \
             a new nation, conceived in Liberty, and dedicated to the proposition that all \
             men are created equal.\n\n\
             Now we are engaged in a great civil war, testing whether that nation, or any \
             nation so conceived and so dedicated, can long endure. We are met on a great \
             battle-field of that war. We have come to dedicate a portion of that field, as a \
             final resting place for those who here gave their lives that that nation might \
             live. It is altogether fitting and proper that we should do this.\n\n\
             But, in a larger sense, we can not dedicate, we can not consecrate, we can not \
             hallow this ground. The brave men, living and dead, who struggled here, have \
             consecrated it, far above our poor power to add or detract. The world will \
             little note, nor long remember what we say here, but it can never forget what \
             they did here. It is for us the living, rather, to be dedicated here to the \
             unfinished work which they who fought here have thus far so nobly advanced. It \
             is rather for us to be here dedicated to the great task remaining before us, \
             that from these honored dead we take increased devotion to that cause for which \
             they gave the last full measure of devotion, that we here highly resolve that \
             these dead shall not have died in vain, that this nation, under God, shall have \
             a new birth of freedom, and that government of the people, by the people, for \
             the people, shall not perish from the earth.",
        )
    }
}
