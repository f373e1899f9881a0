//! Word-prefix search over contact names.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parlor_shared::UserId;

#[derive(Debug, Default)]
pub struct ContactsIndex {
    words: BTreeMap<String, BTreeSet<UserId>>,
    by_user: HashMap<UserId, Vec<String>>,
}

fn split_words(text: &str) -> Vec<String> {
    let mut words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();
    words.sort();
    words.dedup();
    words
}

impl ContactsIndex {
    /// Index `user_id` under the words of `text`, replacing what it had.
    pub fn update(&mut self, user_id: UserId, text: &str) {
        self.remove(user_id);
        let words = split_words(text);
        for word in &words {
            self.words.entry(word.clone()).or_default().insert(user_id);
        }
        self.by_user.insert(user_id, words);
    }

    pub fn remove(&mut self, user_id: UserId) {
        let Some(words) = self.by_user.remove(&user_id) else {
            return;
        };
        for word in words {
            if let Some(users) = self.words.get_mut(&word) {
                users.remove(&user_id);
                if users.is_empty() {
                    self.words.remove(&word);
                }
            }
        }
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.by_user.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    /// Users having a word starting with each word of `query`, ordered by id.
    /// An empty query lists every contact.
    pub fn search(&self, query: &str, limit: usize) -> Vec<UserId> {
        let query_words = split_words(query);
        if query_words.is_empty() {
            let mut all: Vec<UserId> = self.by_user.keys().copied().collect();
            all.sort();
            all.truncate(limit);
            return all;
        }

        let mut result: Option<BTreeSet<UserId>> = None;
        for prefix in &query_words {
            let matches: BTreeSet<UserId> = self
                .words
                .range(prefix.clone()..)
                .take_while(|(word, _)| word.starts_with(prefix.as_str()))
                .flat_map(|(_, users)| users.iter().copied())
                .collect();
            result = Some(match result {
                Some(found) => found.intersection(&matches).copied().collect(),
                None => matches,
            });
        }

        result
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_search() {
        let mut index = ContactsIndex::default();
        index.update(UserId(1), "Ada Lovelace");
        index.update(UserId(2), "Alan Turing");
        index.update(UserId(3), "Grace Hopper");

        assert_eq!(index.search("a", 10), vec![UserId(1), UserId(2)]);
        assert_eq!(index.search("al tur", 10), vec![UserId(2)]);
        assert_eq!(index.search("HOP", 10), vec![UserId(3)]);
        assert!(index.search("zed", 10).is_empty());
        assert_eq!(index.search("", 2), vec![UserId(1), UserId(2)]);
    }

    #[test]
    fn test_update_replaces_old_words() {
        let mut index = ContactsIndex::default();
        index.update(UserId(1), "Ada Lovelace");
        index.update(UserId(1), "Augusta King");

        assert!(index.search("lovelace", 10).is_empty());
        assert_eq!(index.search("king", 10), vec![UserId(1)]);

        index.remove(UserId(1));
        assert!(index.is_empty());
        assert!(index.search("king", 10).is_empty());
    }
}
