use core::ptr;

use crate::request::Request;

/// Intrusive FIFO of caller-owned requests.
///
/// Links live inside the requests themselves, so the queue never allocates
/// and never owns what it holds. `head` and `tail` are both `None` exactly
/// when the queue is empty.
pub(crate) struct Queue<'a> {
    head: Option<&'a Request<'a>>,
    tail: Option<&'a Request<'a>>,
    len: usize,
}

impl<'a> Queue<'a> {
    pub(crate) const fn new() -> Self {
        Self { head: None, tail: None, len: 0 }
    }

    pub(crate) fn push_back(&mut self, request: &'a Request<'a>) {
        request.set_next(None);
        match self.tail {
            None => self.head = Some(request),
            Some(tail) => tail.set_next(Some(request)),
        }
        self.tail = Some(request);
        self.len += 1;
    }

    pub(crate) fn pop_front(&mut self) -> Option<&'a Request<'a>> {
        let head = self.head?;
        self.head = head.next();
        if self.head.is_none() {
            self.tail = None;
        }
        head.set_next(None);
        self.len -= 1;
        Some(head)
    }

    pub(crate) fn front(&self) -> Option<&'a Request<'a>> {
        self.head
    }

    pub(crate) fn is_front(&self, request: &Request<'a>) -> bool {
        self.head.is_some_and(|head| ptr::eq(head, request))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Drop every link without touching the requests' statuses.
    pub(crate) fn clear(&mut self) {
        while self.pop_front().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let a = Request::new();
        let b = Request::new();
        let c = Request::new();
        let mut queue = Queue::new();

        queue.push_back(&a);
        queue.push_back(&b);
        queue.push_back(&c);
        assert_eq!(queue.len(), 3);
        assert!(queue.is_front(&a));

        assert!(ptr::eq(queue.pop_front().unwrap(), &a));
        assert!(ptr::eq(queue.pop_front().unwrap(), &b));
        assert!(ptr::eq(queue.pop_front().unwrap(), &c));
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn removing_last_clears_head_and_tail() {
        let a = Request::new();
        let mut queue = Queue::new();

        queue.push_back(&a);
        queue.pop_front();

        assert!(queue.head.is_none());
        assert!(queue.tail.is_none());
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn push_after_drain_relinks_from_empty() {
        let a = Request::new();
        let b = Request::new();
        let mut queue = Queue::new();

        queue.push_back(&a);
        queue.pop_front();
        queue.push_back(&b);

        assert!(queue.is_front(&b));
        assert!(ptr::eq(queue.tail.unwrap(), &b));
        assert!(b.next().is_none());
    }

    #[test]
    fn popped_request_is_unlinked() {
        let a = Request::new();
        let b = Request::new();
        let mut queue = Queue::new();

        queue.push_back(&a);
        queue.push_back(&b);
        queue.pop_front();

        assert!(a.next().is_none());
        assert!(ptr::eq(queue.front().unwrap(), &b));
    }

    #[test]
    fn clear_empties_queue() {
        let a = Request::new();
        let b = Request::new();
        let mut queue = Queue::new();

        queue.push_back(&a);
        queue.push_back(&b);
        queue.clear();

        assert!(queue.is_empty());
        assert!(queue.tail.is_none());
    }
}
