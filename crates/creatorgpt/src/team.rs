//! The team roster shown on the about page.
//!
//! Members are the only subjects a [`LikeCounter`](crate::LikeCounter) is
//! meant to track; the server refuses like requests for any other id.

use serde::Serialize;

/// Links to a member's profiles. Missing links are omitted when serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Socials {
    /// YouTube channel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube: Option<&'static str>,
    /// Instagram profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<&'static str>,
    /// Facebook profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook: Option<&'static str>,
    /// LinkedIn profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<&'static str>,
}

impl Socials {
    const NONE: Self = Self { youtube: None, instagram: None, facebook: None, linkedin: None };
}

/// One person on the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TeamMember {
    /// Stable identifier, also the like subject id
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Role on the team
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    /// Avatar URL
    pub image: &'static str,
    /// Short introduction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<&'static str>,
    /// Profile links
    pub socials: Socials,
    /// Contact number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<&'static str>,
}

/// Everyone on the team, in display order.
pub static TEAM: [TeamMember; 4] = [
    TeamMember {
        id: "shyamchand",
        name: "creator_Shyamchand",
        role: Some("Creator & Developer"),
        image: "https://i.ibb.co/TzBnXSF/1752411802894.jpg",
        bio: Some(
            "Hello! I'm Shyamchand Das, the creator behind CreatorGpt. Passionate about AI, web dev, and content creation.",
        ),
        socials: Socials {
            youtube: Some("https://youtube.com/@CREATORSHYAMCHAND"),
            instagram: Some("https://www.instagram.com/creator_shyamchand/"),
            facebook: None,
            linkedin: Some("https://www.linkedin.com/in/shyam-chand-mahato-557342287/"),
        },
        phone: None,
    },
    TeamMember {
        id: "rajat",
        name: "Smile__Killar__Rajat",
        role: None,
        image: "https://i.ibb.co/qMdkW2p8/smile-killar-rajat-20250725-0001.jpg",
        bio: None,
        socials: Socials::NONE,
        phone: Some("+91 9933136600"),
    },
    TeamMember {
        id: "supriyo",
        name: "IT'Z SUPRIYO",
        role: None,
        image: "https://i.ibb.co/KxJBvpsN/5fb9f5a1bbfe427571a448b63a0859e8.jpg",
        bio: None,
        socials: Socials::NONE,
        phone: Some("+91 8167686713"),
    },
    TeamMember {
        id: "suresh",
        name: "IT'S SURESH",
        role: None,
        image: "https://i.ibb.co/PG0SYRy5/itz-suresh-0m-20250727-0001.jpg",
        bio: None,
        socials: Socials::NONE,
        phone: Some("+01 234 567 892"),
    },
];

impl TeamMember {
    /// Look up a member by id
    pub fn find(id: &str) -> Option<&'static TeamMember> {
        TEAM.iter().find(|member| member.id == id)
    }
}

/// Like count as shown on a button: exact below 1000, then thousands with one
/// decimal, e.g. `1.2k`.
pub fn format_count(count: u64) -> String {
    if count < 1000 {
        return count.to_string();
    }
    format!("{:.1}k", count as f64 / 1000.0)
}
