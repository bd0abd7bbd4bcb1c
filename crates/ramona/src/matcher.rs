/// Incremental substring search over a byte stream that arrives in chunks.
///
/// Knuth-Morris-Pratt automaton: the only state carried between calls to
/// [`StreamMatcher::submit`] is the length of the longest proper prefix of the
/// pattern that ends the input consumed so far, so a match straddling two
/// reads is still found and no consumed byte is ever scanned twice.
#[derive(Debug, Clone)]
pub struct StreamMatcher {
	pattern: Vec<u8>,
	failure: Vec<usize>,
	matched: usize,
}

impl StreamMatcher {
	pub fn new(pattern: impl AsRef<[u8]>) -> Self {
		let pattern = pattern.as_ref().to_vec();
		let failure = failure_table(&pattern);
		Self {
			pattern,
			failure,
			matched: 0,
		}
	}

	pub fn pattern(&self) -> &[u8] {
		&self.pattern
	}

	/// Feed the next chunk of the stream.
	///
	/// Returns the offset within `chunk` of the byte that completes the first
	/// occurrence of the pattern, if one completes in this chunk. Bytes after
	/// that offset are not consumed; callers that want every occurrence submit
	/// `&chunk[offset + 1..]` next.
	pub fn submit(&mut self, chunk: &[u8]) -> Option<usize> {
		if self.pattern.is_empty() {
			return None;
		}

		for (offset, &byte) in chunk.iter().enumerate() {
			while self.matched > 0 && self.pattern[self.matched] != byte {
				self.matched = self.failure[self.matched - 1];
			}
			if self.pattern[self.matched] == byte {
				self.matched += 1;
			}
			if self.matched == self.pattern.len() {
				self.matched = self.failure[self.matched - 1];
				return Some(offset);
			}
		}
		None
	}
}

// failure[i] = length of the longest proper prefix of pattern[..=i] that is
// also a suffix of it.
fn failure_table(pattern: &[u8]) -> Vec<usize> {
	let mut failure = vec![0; pattern.len()];
	let mut k = 0;
	for i in 1..pattern.len() {
		while k > 0 && pattern[i] != pattern[k] {
			k = failure[k - 1];
		}
		if pattern[i] == pattern[k] {
			k += 1;
		}
		failure[i] = k;
	}
	failure
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_pattern_inside_one_chunk() {
		let mut m = StreamMatcher::new("error");
		assert_eq!(m.submit(b"no problem here"), None);
		assert_eq!(m.submit(b"fatal error: disk"), Some(10));
	}

	#[test]
	fn finds_pattern_split_across_chunks() {
		let mut m = StreamMatcher::new("error");
		assert_eq!(m.submit(b"something went er"), None);
		assert_eq!(m.submit(b"ror, retrying"), Some(2));
		assert_eq!(m.submit(b" and carried on"), None);
	}

	#[test]
	fn byte_at_a_time_without_pattern_never_matches() {
		let mut m = StreamMatcher::new("error");
		let text = b"err erro eror errr rror e r r o r erorr terr0r ".repeat(200);
		for byte in text.iter() {
			assert_eq!(m.submit(std::slice::from_ref(byte)), None);
		}
	}

	#[test]
	fn byte_at_a_time_finds_pattern_once() {
		let mut m = StreamMatcher::new("error");
		let hits = b"xxerrorxx"
			.iter()
			.filter(|b| m.submit(std::slice::from_ref(*b)).is_some())
			.count();
		assert_eq!(hits, 1);
	}

	#[test]
	fn empty_pattern_never_matches() {
		let mut m = StreamMatcher::new("");
		assert_eq!(m.submit(b"anything at all"), None);
		assert_eq!(m.submit(b""), None);
	}

	#[test]
	fn self_overlapping_pattern_recovers_partial_match() {
		let mut m = StreamMatcher::new("aab");
		assert_eq!(m.submit(b"aa"), None);
		assert_eq!(m.submit(b"aab"), Some(2));
	}

	#[test]
	fn reports_first_match_then_continues_on_remainder() {
		let mut m = StreamMatcher::new("abab");
		let chunk = b"ababab";
		let first = m.submit(chunk).unwrap();
		assert_eq!(first, 3);
		// The automaton keeps the "ab" border, so the overlapping occurrence
		// completes two bytes later.
		assert_eq!(m.submit(&chunk[first + 1..]), Some(1));
	}

	#[test]
	fn failure_table_matches_reference_values() {
		assert_eq!(failure_table(b"abab"), vec![0, 0, 1, 2]);
		assert_eq!(failure_table(b"aabaaa"), vec![0, 1, 0, 1, 2, 2]);
		assert!(failure_table(b"").is_empty());
	}
}
