//! Pure merge functions for cached collections.
//!
//! Every function returns a new list ordered newest `createdAt` first (ties by
//! id) with at most one entry per id, so applying the same input twice gives
//! the same result as applying it once.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::posting::models::Post;

fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn keep_freshest(by_id: &mut HashMap<String, Post>, post: Post) {
    match by_id.entry(post.id.clone()) {
        Entry::Occupied(mut slot) => {
            if post.created_at > slot.get().created_at {
                slot.insert(post);
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(post);
        }
    }
}

/// Applies an authoritative snapshot. The result holds exactly the ids of
/// `incoming`; for an id known on both sides the freshest `createdAt` wins,
/// the snapshot on ties.
pub fn reconcile(current: &[Post], incoming: Vec<Post>) -> Vec<Post> {
    let mut by_id: HashMap<String, Post> = HashMap::with_capacity(incoming.len());
    for post in incoming {
        keep_freshest(&mut by_id, post);
    }
    for local in current {
        if let Some(remote) = by_id.get_mut(&local.id) {
            if local.created_at > remote.created_at {
                *remote = local.clone();
            }
        }
    }

    let mut merged: Vec<Post> = by_id.into_values().collect();
    sort_newest_first(&mut merged);
    merged
}

/// Inserts or replaces one post after a local write. An existing entry only
/// survives if it is strictly fresher.
pub fn splice(current: &[Post], post: Post) -> Vec<Post> {
    let mut next: Vec<Post> = Vec::with_capacity(current.len() + 1);
    let mut incoming = Some(post);
    for existing in current {
        match &incoming {
            Some(p) if p.id == existing.id => {
                if existing.created_at > p.created_at {
                    next.push(existing.clone());
                    incoming = None;
                } else if let Some(p) = incoming.take() {
                    next.push(p);
                }
            }
            _ => next.push(existing.clone()),
        }
    }
    if let Some(p) = incoming {
        next.push(p);
    }

    let mut by_id = HashMap::with_capacity(next.len());
    for post in next {
        keep_freshest(&mut by_id, post);
    }
    let mut merged: Vec<Post> = by_id.into_values().collect();
    sort_newest_first(&mut merged);
    merged
}

pub fn without(current: &[Post], id: &str) -> Vec<Post> {
    current.iter().filter(|p| p.id != id).cloned().collect()
}
