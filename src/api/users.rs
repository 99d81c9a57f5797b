// Static user table

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: u32,
    pub name: &'static str,
    pub email: &'static str,
}

static USERS: [User; 3] = [
    User {
        id: 1,
        name: "John Doe",
        email: "john@example.com",
    },
    User {
        id: 2,
        name: "Jane Smith",
        email: "jane@example.com",
    },
    User {
        id: 3,
        name: "Bob Johnson",
        email: "bob@example.com",
    },
];

/// All seeded users, in id order
pub fn all() -> &'static [User] {
    &USERS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_not_empty() {
        assert!(!all().is_empty());
    }

    #[test]
    fn test_ids_unique_and_ordered() {
        let ids: Vec<u32> = all().iter().map(|u| u.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    }

    #[test]
    fn test_emails_look_valid() {
        for user in all() {
            assert!(!user.name.is_empty());
            assert!(user.email.contains('@'), "bad email: {}", user.email);
        }
    }
}
