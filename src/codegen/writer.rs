use super::options::LineEnding;

const INDENT: &str = "    ";

/// Line buffer with a current indentation level.
#[derive(Debug, Default)]
pub struct ScriptWriter {
    lines: Vec<String>,
    level: usize,
}

impl ScriptWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.trim().is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{}", INDENT.repeat(self.level), text));
        }
    }

    /// Emits template lines; indentation inside them is kept relative to the
    /// current level.
    pub fn lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.line(line);
        }
    }

    pub fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| !l.is_empty()) {
            self.lines.push(String::new());
        }
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn finish(mut self, ending: LineEnding) -> String {
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
        let ending = ending.as_str();
        let mut out = self.lines.join(ending);
        out.push_str(ending);
        out
    }
}
