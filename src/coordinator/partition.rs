use crate::coordinator::assignment::WordlistChunk;

/// Split `wordlists` into chunks for `peer_count` peers.
///
/// With at least as many wordlists as peers every wordlist stays whole.
/// Otherwise each wordlist is cut into `ceil(peers / wordlists)` slices so that
/// every peer receives a chunk; chunks shrink as the team grows. Slices of one
/// wordlist are contiguous in the returned order.
pub fn partition(wordlists: &[String], peer_count: usize) -> Vec<WordlistChunk> {
    if wordlists.is_empty() {
        return Vec::new();
    }

    if peer_count <= wordlists.len() {
        return wordlists.iter().map(WordlistChunk::whole).collect();
    }

    let slices = peer_count.div_ceil(wordlists.len()) as u32;
    wordlists
        .iter()
        .flat_map(|wordlist| (0..slices).map(move |i| WordlistChunk::slice(wordlist.clone(), i, slices)))
        .collect()
}
