use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Minimal line editor for the filter query on the status line.
#[derive(Default)]
pub struct Inputter {
    current_input: String,
    curser_pos: usize, // in chars, not bytes
    finished: bool,
    canceled: bool,
}

#[derive(Default, Clone, Debug)]
pub struct InputResult {
    pub input: String,
    pub finished: bool,
    pub canceled: bool,
    pub curser_pos: usize,
}

impl Inputter {
    pub fn read(&mut self, key: KeyEvent) -> InputResult {
        match (key.code, key.modifiers) {
            (KeyCode::Enter, KeyModifiers::NONE) => self.finished = true,
            (KeyCode::Esc, KeyModifiers::NONE) => {
                self.finished = true;
                self.canceled = true;
            }
            (KeyCode::Backspace, KeyModifiers::NONE) => self.backspace(),
            (KeyCode::Left, KeyModifiers::NONE) => {
                self.curser_pos = self.curser_pos.saturating_sub(1);
            }
            (KeyCode::Right, KeyModifiers::NONE) => {
                self.curser_pos = (self.curser_pos + 1).min(self.current_input.chars().count());
            }
            (code, _) => self.key(code),
        }
        self.get()
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            input: self.current_input.clone(),
            finished: self.finished,
            canceled: self.canceled,
            curser_pos: self.curser_pos,
        }
    }

    pub fn clear(&mut self) {
        *self = Inputter::default();
    }

    fn backspace(&mut self) {
        if self.curser_pos > 0 {
            self.curser_pos -= 1;
            let pos = self.getbytepos();
            self.current_input.remove(pos);
        }
    }

    fn key(&mut self, code: KeyCode) {
        if let Some(chr) = code.as_char() {
            let pos = self.getbytepos();
            self.current_input.insert(pos, chr);
            self.curser_pos += 1;
        }
    }

    fn getbytepos(&self) -> usize {
        self.current_input
            .char_indices()
            .nth(self.curser_pos)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.current_input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(inputter: &mut Inputter, code: KeyCode) -> InputResult {
        inputter.read(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn typing_builds_up_the_query() {
        let mut inputter = Inputter::default();
        press(&mut inputter, KeyCode::Char('a'));
        let result = press(&mut inputter, KeyCode::Char('b'));
        assert_eq!(result.input, "ab");
        assert!(!result.finished);
    }

    #[test]
    fn backspace_removes_before_the_curser() {
        let mut inputter = Inputter::default();
        press(&mut inputter, KeyCode::Char('a'));
        press(&mut inputter, KeyCode::Char('b'));
        press(&mut inputter, KeyCode::Left);
        let result = press(&mut inputter, KeyCode::Backspace);
        assert_eq!(result.input, "b");
    }

    #[test]
    fn enter_finishes_escape_cancels() {
        let mut inputter = Inputter::default();
        press(&mut inputter, KeyCode::Char('x'));
        let result = press(&mut inputter, KeyCode::Enter);
        assert!(result.finished && !result.canceled);

        inputter.clear();
        let result = press(&mut inputter, KeyCode::Esc);
        assert!(result.finished && result.canceled);
    }
}
