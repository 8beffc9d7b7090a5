//! Newtype wrappers for displaying groups of domain objects.

use std::{fmt, ops::Index};

use crate::models::{Message, Step};

/// Displays a list of steps, each in its own section.
///
/// # Examples
///
/// ```rust
/// use stepwise_core::display::Steps;
///
/// let steps = Steps(Vec::new());
/// assert_eq!(steps.to_string(), "No steps found.\n");
/// ```
pub struct Steps(pub Vec<Step>);

impl Steps {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.0.iter()
    }
}

impl Index<usize> for Steps {
    type Output = Step;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a Steps {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Steps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            writeln!(f, "No steps found.")
        } else {
            for step in &self.0 {
                write!(f, "{step}")?;
            }
            Ok(())
        }
    }
}

/// Displays an audit log oldest first.
pub struct Messages(pub Vec<Message>);

impl Messages {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Messages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No messages found.");
        }
        for (index, message) in self.0.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{message}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;

    use super::*;
    use crate::{
        models::{MessageRole, StepStatus},
        test_support::step,
    };

    fn message(id: u64, content: &str) -> Message {
        Message {
            id,
            session_id: "s1".into(),
            plan_id: 1,
            step_id: Some(id),
            agent_name: "company".into(),
            role: MessageRole::Assistant,
            content: content.into(),
            created_at: Timestamp::from_second(1_700_000_000).unwrap(),
        }
    }

    #[test]
    fn test_steps_display() {
        let steps = Steps(vec![
            step(1, 0, "company", &[], StepStatus::Completed),
            step(2, 1, "summarizer", &[1], StepStatus::Pending),
        ]);
        let output = steps.to_string();
        assert!(output.contains("✓ COMPLETED"));
        assert!(output.contains("○ PENDING"));
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].agent_name, "summarizer");
    }

    #[test]
    fn test_messages_display() {
        assert_eq!(Messages(Vec::new()).to_string(), "No messages found.\n");

        let output = Messages(vec![message(1, "first"), message(2, "second")]).to_string();
        assert!(output.contains("**company** (assistant step 1"));
        let first = output.find("first").unwrap();
        let second = output.find("second").unwrap();
        assert!(first < second);
    }
}
