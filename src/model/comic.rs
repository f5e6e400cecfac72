use super::Item;
use serde::{Deserialize, Serialize};

/// Raw `info.0.json` payload returned by the archive for a single comic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ComicInfo {
    pub num: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub safe_title: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub img: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub news: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub month: String,
    #[serde(default)]
    pub day: String,
}

/// Stored representation of a comic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comic {
    pub id: u64,
    pub title: String,
    pub safe_title: String,
    pub alt: String,
    pub img: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transcript: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub news: String,
    /// Publication date as `YYYY-MM-DD`, absent when the archive sent an
    /// incomplete or non-numeric date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

impl Item for Comic {
    fn id(&self) -> u64 {
        self.id
    }
}

impl From<ComicInfo> for Comic {
    fn from(info: ComicInfo) -> Self {
        let published = publication_date(&info.year, &info.month, &info.day);
        Self {
            id: info.num,
            title: info.title,
            safe_title: info.safe_title,
            alt: info.alt,
            img: info.img,
            transcript: info.transcript,
            link: info.link,
            news: info.news,
            published,
        }
    }
}

fn publication_date(year: &str, month: &str, day: &str) -> Option<String> {
    let year: u32 = year.trim().parse().ok()?;
    let month: u32 = month.trim().parse().ok()?;
    let day: u32 = day.trim().parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(format!("{year:04}-{month:02}-{day:02}"))
}

#[cfg(test)]
pub(crate) fn sample_comic(id: u64) -> Comic {
    Comic::from(ComicInfo {
        num: id,
        title: format!("comic {id}"),
        safe_title: format!("comic {id}"),
        ..ComicInfo::default()
    })
}
