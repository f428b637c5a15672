//! Login bookkeeping on top of the immutable user directory.
//!
//! The directory itself never changes after config parse; the only mutable
//! bit per user is "logged in somewhere", kept here as an atomic flag so a
//! `pass` race between two sessions resolves to exactly one winner.

use std::sync::atomic::{AtomicBool, Ordering};

use grass_config::UserDirectory;

/// Outcome of a `pass` attempt against the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyOnline,
    BadPassword,
}

pub struct Roster {
    directory: UserDirectory,
    online: Vec<AtomicBool>,
}

impl Roster {
    pub fn new(directory: UserDirectory) -> Self {
        let online = (0..directory.len()).map(|_| AtomicBool::new(false)).collect();
        Self { directory, online }
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.directory.find(name)
    }

    /// Test-and-set the logged-in flag for one user. The already-online
    /// check precedes the password check, so probing an occupied account
    /// does not reveal whether the password was right.
    pub fn try_claim(&self, idx: usize, password_ok: bool) -> ClaimOutcome {
        if self.online[idx].load(Ordering::SeqCst) {
            return ClaimOutcome::AlreadyOnline;
        }
        if !password_ok {
            return ClaimOutcome::BadPassword;
        }
        match self.online[idx].compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => ClaimOutcome::Claimed,
            Err(_) => ClaimOutcome::AlreadyOnline,
        }
    }

    pub fn release(&self, idx: usize) {
        self.online[idx].store(false, Ordering::SeqCst);
    }

    /// Usernames currently logged in, in config order.
    pub fn online_names(&self) -> Vec<String> {
        self.directory
            .iter()
            .enumerate()
            .filter(|(i, _)| self.online[*i].load(Ordering::SeqCst))
            .map(|(_, u)| u.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use grass_config::ServerConfig;

    fn roster() -> Roster {
        let cfg = ServerConfig::parse_str(
            "base /b\nport 1\nuser alice secret\nuser bob hunter2\n",
            "/",
        )
        .unwrap();
        Roster::new(cfg.users)
    }

    #[test]
    fn claim_is_exclusive() {
        let r = roster();
        let idx = r.find("alice").unwrap();
        assert_eq!(r.try_claim(idx, true), ClaimOutcome::Claimed);
        assert_eq!(r.try_claim(idx, true), ClaimOutcome::AlreadyOnline);
        r.release(idx);
        assert_eq!(r.try_claim(idx, true), ClaimOutcome::Claimed);
    }

    #[test]
    fn occupied_wins_over_bad_password() {
        let r = roster();
        let idx = r.find("alice").unwrap();
        assert_eq!(r.try_claim(idx, false), ClaimOutcome::BadPassword);
        assert_eq!(r.try_claim(idx, true), ClaimOutcome::Claimed);
        assert_eq!(r.try_claim(idx, false), ClaimOutcome::AlreadyOnline);
    }

    #[test]
    fn online_names_follow_config_order() {
        let r = roster();
        let bob = r.find("bob").unwrap();
        let alice = r.find("alice").unwrap();
        assert_eq!(r.try_claim(bob, true), ClaimOutcome::Claimed);
        assert_eq!(r.try_claim(alice, true), ClaimOutcome::Claimed);
        assert_eq!(r.online_names(), vec!["alice", "bob"]);
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        use std::sync::Arc;

        let r = Arc::new(roster());
        let idx = r.find("alice").unwrap();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let r = Arc::clone(&r);
                std::thread::spawn(move || r.try_claim(idx, true) == ClaimOutcome::Claimed)
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(winners, 1);
    }
}
