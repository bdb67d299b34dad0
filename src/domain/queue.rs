use std::collections::VecDeque;

/// FIFO buffer backing a partition.
///
/// Every operation is O(1) and none of them block or fail: an empty queue
/// simply yields `None`. The queue enforces no bound, so retention is up to
/// the owner.
#[derive(Debug, Clone)]
pub struct Queue<T> {
    elements: VecDeque<T>,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            elements: VecDeque::new(),
        }
    }

    /// Append an element to the tail
    pub fn push(&mut self, element: T) {
        self.elements.push_back(element);
    }

    /// Remove and return the head
    pub fn pop(&mut self) -> Option<T> {
        self.elements.pop_front()
    }

    /// The head, without removing it
    pub fn peek(&self) -> Option<&T> {
        self.elements.front()
    }

    /// The most recently pushed element
    pub fn peek_back(&self) -> Option<&T> {
        self.elements.back()
    }

    /// Positional read counted from the head
    pub fn get(&self, index: usize) -> Option<&T> {
        self.elements.get(index)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_pop_preserve_order() {
        let cases: Vec<(&str, Vec<&str>, usize)> = vec![
            ("pop none", vec!["a", "b", "c"], 0),
            ("pop one", vec!["a", "b", "c"], 1),
            ("pop from empty queue", vec![], 1),
            ("pop all", vec!["a", "b"], 2),
        ];

        for (name, elements, pop_count) in cases {
            let mut queue = Queue::new();
            for e in &elements {
                queue.push(*e);
            }
            assert_eq!(queue.len(), elements.len(), "{}", name);

            let popped: Vec<_> = (0..pop_count).filter_map(|_| queue.pop()).collect();
            let expected_popped: Vec<_> = elements.iter().take(pop_count).copied().collect();
            assert_eq!(popped, expected_popped, "{}", name);

            assert_eq!(queue.len(), elements.len().saturating_sub(pop_count), "{}", name);
            for i in 0..queue.len() {
                assert_eq!(queue.get(i), elements.get(i + pop_count), "{}", name);
            }
        }
    }

    #[test]
    fn test_peek() {
        let mut queue = Queue::new();
        assert!(queue.peek().is_none());
        assert!(queue.peek_back().is_none());
        assert!(queue.is_empty());

        queue.push(1);
        queue.push(2);
        assert_eq!(queue.peek(), Some(&1));
        assert_eq!(queue.peek_back(), Some(&2));
        // peeking does not consume
        assert_eq!(queue.len(), 2);
    }
}
