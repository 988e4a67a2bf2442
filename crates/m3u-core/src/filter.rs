use crate::playlist::Channel;

/// Keep the channels whose name or group contains any of `keywords`,
/// compared case-insensitively. No keywords means no matches.
pub fn filter_channels<S: AsRef<str>>(channels: &[Channel], keywords: &[S]) -> Vec<Channel> {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Vec::new();
    }

    channels
        .iter()
        .filter(|ch| {
            let name = ch.name.to_lowercase();
            let group = ch.group.as_deref().unwrap_or_default().to_lowercase();
            keywords
                .iter()
                .any(|k| name.contains(k.as_str()) || group.contains(k.as_str()))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> Vec<Channel> {
        vec![
            Channel::new(1, "ESPN HD", "http://a/1").with_group("Sports"),
            Channel::new(2, "Disney +", "http://a/2").with_group("Kids"),
            Channel::new(3, "Local News", "http://a/3"),
            Channel::new(4, "Match Day", "http://a/4").with_group("ESPN Extra"),
        ]
    }

    #[test]
    fn matches_name_or_group_case_insensitively() {
        let matched = filter_channels(&channels(), &["espn"]);
        let ids: Vec<usize> = matched.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn channel_matching_several_keywords_appears_once() {
        let matched = filter_channels(&channels(), &["ESPN", "sports"]);
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn blank_keywords_match_nothing() {
        assert!(filter_channels(&channels(), &["  ", ""]).is_empty());
        assert!(filter_channels::<&str>(&channels(), &[]).is_empty());
    }

    #[test]
    fn keywords_are_trimmed() {
        let matched = filter_channels(&channels(), &[" disney + "]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, 2);
    }
}
