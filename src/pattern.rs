//! Lua 5.3 string patterns.
//!
//! A backtracking matcher working directly over the pattern bytes, in
//! the shape of the reference implementation: character classes and
//! their complements, `.`, sets with ranges, the `* + - ?` quantifiers
//! (`-` is lazy), anchors, captures (including position captures) and
//! back-references. The balanced (`%b`) and frontier (`%f`) items are
//! not supported and raise a domain error.

use crate::error::{LuaError, LuaResult};

const MAX_CAPTURES: usize = 32;
const MAX_DEPTH: usize = 220;

/// Unclosed capture sentinel.
const CAP_UNFINISHED: isize = -1;
/// Position capture sentinel.
const CAP_POSITION: isize = -2;

#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    /// A byte span `[start, end)` of the subject.
    Span(usize, usize),
    /// A position capture `()` — 1-based, as exposed to Lua.
    Pos(usize),
}

#[derive(Debug, Clone)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<Capture>,
}

impl Match {
    /// The explicit captures, or the whole match when there are none.
    pub fn captures_or_whole(&self) -> Vec<Capture> {
        if self.captures.is_empty() {
            vec![Capture::Span(self.start, self.end)]
        } else {
            self.captures.clone()
        }
    }
}

struct CapInfo {
    start: usize,
    len: isize,
}

struct MatchState<'a> {
    src: &'a [u8],
    pat: &'a [u8],
    caps: Vec<CapInfo>,
    depth: usize,
}

/// Find the first match of `pat` in `src` at or after byte index `init`.
/// A leading `^` anchors the search to `init`.
pub fn first_match(src: &[u8], pat: &[u8], init: usize) -> LuaResult<Option<Match>> {
    let (anchored, pstart) = match pat.first() {
        Some(b'^') => (true, 1),
        _ => (false, 0),
    };
    let mut state = MatchState {
        src,
        pat,
        caps: Vec::new(),
        depth: 0,
    };
    let mut s = init.min(src.len());
    loop {
        state.caps.clear();
        state.depth = 0;
        if let Some(end) = state.do_match(s, pstart)? {
            let captures = state.finished_captures()?;
            return Ok(Some(Match {
                start: s,
                end,
                captures,
            }));
        }
        if anchored || s >= src.len() {
            return Ok(None);
        }
        s += 1;
    }
}

impl MatchState<'_> {
    fn finished_captures(&self) -> LuaResult<Vec<Capture>> {
        let mut out = Vec::with_capacity(self.caps.len());
        for cap in &self.caps {
            match cap.len {
                CAP_UNFINISHED => return Err(LuaError::runtime("unfinished capture")),
                CAP_POSITION => out.push(Capture::Pos(cap.start + 1)),
                len => out.push(Capture::Span(cap.start, cap.start + len as usize)),
            }
        }
        Ok(out)
    }

    fn do_match(&mut self, mut s: usize, mut p: usize) -> LuaResult<Option<usize>> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(LuaError::runtime("pattern too complex"));
        }
        let result = loop {
            if p >= self.pat.len() {
                break Some(s);
            }
            match self.pat[p] {
                b'(' => {
                    break if self.pat.get(p + 1) == Some(&b')') {
                        self.start_capture(s, p + 2, CAP_POSITION)?
                    } else {
                        self.start_capture(s, p + 1, CAP_UNFINISHED)?
                    };
                }
                b')' => break self.end_capture(s, p + 1)?,
                b'$' if p + 1 == self.pat.len() => {
                    break if s == self.src.len() { Some(s) } else { None };
                }
                b'%' => match self.pat.get(p + 1) {
                    Some(b'b') => {
                        return Err(LuaError::runtime(
                            "balanced pattern '%b' is not supported",
                        ))
                    }
                    Some(b'f') => {
                        return Err(LuaError::runtime(
                            "frontier pattern '%f' is not supported",
                        ))
                    }
                    Some(d) if d.is_ascii_digit() => {
                        break self.match_backref(s, p, (*d - b'0') as usize)?;
                    }
                    _ => {
                        if let Some(r) = self.match_default(&mut s, &mut p)? {
                            break r;
                        }
                    }
                },
                _ => {
                    if let Some(r) = self.match_default(&mut s, &mut p)? {
                        break r;
                    }
                }
            }
        };
        self.depth -= 1;
        Ok(result)
    }

    /// The single-item path: a class optionally followed by a
    /// quantifier. Returns `Ok(Some(result))` to finish, `Ok(None)` when
    /// `s`/`p` were advanced and the main loop should continue.
    #[allow(clippy::type_complexity)]
    fn match_default(
        &mut self,
        s: &mut usize,
        p: &mut usize,
    ) -> LuaResult<Option<Option<usize>>> {
        let ep = self.class_end(*p)?;
        let matched = *s < self.src.len() && self.single_match(self.src[*s], *p, ep);
        match self.pat.get(ep) {
            Some(b'?') => {
                if matched {
                    if let Some(r) = self.do_match(*s + 1, ep + 1)? {
                        return Ok(Some(Some(r)));
                    }
                }
                *p = ep + 1;
                Ok(None)
            }
            Some(b'+') => {
                if matched {
                    Ok(Some(self.max_expand(*s + 1, *p, ep)?))
                } else {
                    Ok(Some(None))
                }
            }
            Some(b'*') => Ok(Some(self.max_expand(*s, *p, ep)?)),
            Some(b'-') => Ok(Some(self.min_expand(*s, *p, ep)?)),
            _ => {
                if !matched {
                    return Ok(Some(None));
                }
                *s += 1;
                *p = ep;
                Ok(None)
            }
        }
    }

    /// Greedy repetition: consume as many as possible, then back off.
    fn max_expand(&mut self, s: usize, p: usize, ep: usize) -> LuaResult<Option<usize>> {
        let mut count = 0usize;
        while s + count < self.src.len() && self.single_match(self.src[s + count], p, ep) {
            count += 1;
        }
        loop {
            if let Some(r) = self.do_match(s + count, ep + 1)? {
                return Ok(Some(r));
            }
            if count == 0 {
                return Ok(None);
            }
            count -= 1;
        }
    }

    /// Lazy repetition: try the rest first, consume one on failure.
    fn min_expand(&mut self, mut s: usize, p: usize, ep: usize) -> LuaResult<Option<usize>> {
        loop {
            if let Some(r) = self.do_match(s, ep + 1)? {
                return Ok(Some(r));
            }
            if s < self.src.len() && self.single_match(self.src[s], p, ep) {
                s += 1;
            } else {
                return Ok(None);
            }
        }
    }

    fn start_capture(&mut self, s: usize, p: usize, what: isize) -> LuaResult<Option<usize>> {
        if self.caps.len() >= MAX_CAPTURES {
            return Err(LuaError::runtime("too many captures"));
        }
        self.caps.push(CapInfo {
            start: s,
            len: what,
        });
        let r = self.do_match(s, p)?;
        if r.is_none() {
            self.caps.pop();
        }
        Ok(r)
    }

    fn end_capture(&mut self, s: usize, p: usize) -> LuaResult<Option<usize>> {
        let idx = self
            .caps
            .iter()
            .rposition(|c| c.len == CAP_UNFINISHED)
            .ok_or_else(|| LuaError::runtime("invalid pattern capture"))?;
        self.caps[idx].len = (s - self.caps[idx].start) as isize;
        let r = self.do_match(s, p)?;
        if r.is_none() {
            self.caps[idx].len = CAP_UNFINISHED;
        }
        Ok(r)
    }

    fn match_backref(&mut self, s: usize, p: usize, index: usize) -> LuaResult<Option<usize>> {
        if index == 0 || index > self.caps.len() || self.caps[index - 1].len < 0 {
            return Err(LuaError::runtime(format!(
                "invalid capture index %{}",
                index
            )));
        }
        let cap = &self.caps[index - 1];
        let text = &self.src[cap.start..cap.start + cap.len as usize];
        if self.src[s..].starts_with(text) {
            self.do_match(s + text.len(), p + 2)
        } else {
            Ok(None)
        }
    }

    /// Index just past the class starting at `p`.
    fn class_end(&self, p: usize) -> LuaResult<usize> {
        match self.pat[p] {
            b'%' => {
                if p + 1 >= self.pat.len() {
                    Err(LuaError::runtime("malformed pattern (ends with '%')"))
                } else {
                    Ok(p + 2)
                }
            }
            b'[' => {
                let mut i = p + 1;
                if self.pat.get(i) == Some(&b'^') {
                    i += 1;
                }
                // A leading ']' is a literal member.
                if self.pat.get(i) == Some(&b']') {
                    i += 1;
                }
                loop {
                    match self.pat.get(i) {
                        None => {
                            return Err(LuaError::runtime("malformed pattern (missing ']')"))
                        }
                        Some(b'%') => i += 2,
                        Some(b']') => return Ok(i + 1),
                        _ => i += 1,
                    }
                }
            }
            _ => Ok(p + 1),
        }
    }

    fn single_match(&self, c: u8, p: usize, ep: usize) -> bool {
        match self.pat[p] {
            b'.' => true,
            b'%' => match_class(c, self.pat[p + 1]),
            b'[' => self.match_set(c, p, ep - 1),
            lit => lit == c,
        }
    }

    /// `p` points at `[`, `close` at the matching `]`.
    fn match_set(&self, c: u8, p: usize, close: usize) -> bool {
        let mut i = p + 1;
        let mut negate = false;
        if self.pat.get(i) == Some(&b'^') {
            negate = true;
            i += 1;
        }
        let mut found = false;
        while i < close {
            if self.pat[i] == b'%' && i + 1 < close {
                if match_class(c, self.pat[i + 1]) {
                    found = true;
                }
                i += 2;
            } else if i + 2 < close && self.pat[i + 1] == b'-' {
                if self.pat[i] <= c && c <= self.pat[i + 2] {
                    found = true;
                }
                i += 3;
            } else {
                if self.pat[i] == c {
                    found = true;
                }
                i += 1;
            }
        }
        found != negate
    }
}

/// One class letter against one byte; uppercase letters complement.
fn match_class(c: u8, class: u8) -> bool {
    let res = match class.to_ascii_lowercase() {
        b'a' => c.is_ascii_alphabetic(),
        b'c' => c.is_ascii_control(),
        b'd' => c.is_ascii_digit(),
        b'g' => c.is_ascii_graphic(),
        b'l' => c.is_ascii_lowercase(),
        b'p' => c.is_ascii_punctuation(),
        b's' => c.is_ascii_whitespace(),
        b'u' => c.is_ascii_uppercase(),
        b'w' => c.is_ascii_alphanumeric(),
        b'x' => c.is_ascii_hexdigit(),
        other => return other == c,
    };
    if class.is_ascii_uppercase() {
        !res
    } else {
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(s: &str, p: &str) -> Option<(usize, usize)> {
        first_match(s.as_bytes(), p.as_bytes(), 0)
            .unwrap()
            .map(|m| (m.start, m.end))
    }

    #[test]
    fn literal_and_classes() {
        assert_eq!(find("hello", "ll"), Some((2, 4)));
        assert_eq!(find("abc123", "%d+"), Some((3, 6)));
        assert_eq!(find("abc123", "%a+"), Some((0, 3)));
        assert_eq!(find("abc", "%d"), None);
    }

    #[test]
    fn complement_classes() {
        assert_eq!(find("  x", "%S"), Some((2, 3)));
        assert_eq!(find("a1", "%D"), Some((0, 1)));
    }

    #[test]
    fn anchors() {
        assert_eq!(find("hello", "^he"), Some((0, 2)));
        assert_eq!(find("hello", "^el"), None);
        assert_eq!(find("hello", "lo$"), Some((3, 5)));
        assert_eq!(find("hello", "he$"), None);
    }

    #[test]
    fn quantifiers() {
        assert_eq!(find("aaa", "a*"), Some((0, 3)));
        assert_eq!(find("baa", "a*"), Some((0, 0)));
        assert_eq!(find("<x><y>", "<.->"), Some((0, 3)));
        assert_eq!(find("<x><y>", "<.*>"), Some((0, 6)));
        assert_eq!(find("color", "colou?r"), Some((0, 5)));
    }

    #[test]
    fn sets_and_ranges() {
        assert_eq!(find("hello world", "[aeiou]"), Some((1, 2)));
        assert_eq!(find("x9", "[0-9]"), Some((1, 2)));
        assert_eq!(find("abc", "[^a]+"), Some((1, 3)));
        assert_eq!(find("a-b", "[%-]"), Some((1, 2)));
    }

    #[test]
    fn captures() {
        let m = first_match(b"key=value", b"(%w+)=(%w+)", 0)
            .unwrap()
            .unwrap();
        assert_eq!(m.captures.len(), 2);
        assert_eq!(m.captures[0], Capture::Span(0, 3));
        assert_eq!(m.captures[1], Capture::Span(4, 9));
    }

    #[test]
    fn position_captures() {
        let m = first_match(b"abc", b"b()", 0).unwrap().unwrap();
        assert_eq!(m.captures[0], Capture::Pos(3));
    }

    #[test]
    fn backreferences() {
        assert_eq!(find("abcabc", "(abc)%1"), Some((0, 6)));
        assert_eq!(find("abcabd", "(abc)%1"), None);
    }

    #[test]
    fn escaped_magic_characters() {
        assert_eq!(find("3.14", "%d%.%d"), Some((0, 3)));
        assert_eq!(find("100%", "%%"), Some((3, 4)));
    }

    #[test]
    fn unsupported_items_raise() {
        assert!(first_match(b"(x)", b"%b()", 0).is_err());
        assert!(first_match(b"x", b"%f[%a]", 0).is_err());
    }

    #[test]
    fn malformed_patterns_raise() {
        assert!(first_match(b"x", b"%", 0).is_err());
        assert!(first_match(b"x", b"[abc", 0).is_err());
    }

    #[test]
    fn empty_pattern_matches_everywhere() {
        assert_eq!(find("ab", ""), Some((0, 0)));
    }

    #[test]
    fn word_gsub_shape() {
        // Two word matches in "hello world", as gsub walks them.
        let m1 = first_match(b"hello world", b"%w+", 0).unwrap().unwrap();
        assert_eq!((m1.start, m1.end), (0, 5));
        let m2 = first_match(b"hello world", b"%w+", m1.end).unwrap().unwrap();
        assert_eq!((m2.start, m2.end), (6, 11));
    }
}
