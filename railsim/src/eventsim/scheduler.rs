use crate::time::Time;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::mem;

/// Something due at a given simulated time. Events due at the same time
/// come out in the order they were scheduled.
#[derive(Debug)]
pub struct QueuedEvent<T> {
    pub time: OrderedFloat<f64>,
    pub id: usize,
    pub event: T,
}

impl<T> Ord for QueuedEvent<T> {
    fn cmp(&self, other: &QueuedEvent<T>) -> Ordering {
        // Note that the order is flipped on purpose -- to turn
        // the (maximum) BinaryHeap into a minimum heap.
        other.time.cmp(&self.time).then_with(|| other.id.cmp(&self.id))
    }
}

impl<T> PartialOrd for QueuedEvent<T> {
    fn partial_cmp(&self, other: &QueuedEvent<T>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for QueuedEvent<T> {
    fn eq(&self, other: &QueuedEvent<T>) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for QueuedEvent<T> {}

/// Timed queue drained by the clock: events are released once simulated
/// time reaches them.
#[derive(Debug)]
pub struct Scheduler<T> {
    queue: BinaryHeap<QueuedEvent<T>>,
    id_counter: usize,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Scheduler { queue: BinaryHeap::new(), id_counter: 0 }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn schedule(&mut self, at: Time, event: T) {
        let qe = QueuedEvent {
            time: OrderedFloat::from(at.seconds()),
            id: self.id_counter,
            event,
        };
        self.id_counter += 1;
        self.queue.push(qe);
    }

    /// Removes and returns, in time order, every event due at or before `now`.
    pub fn pop_due(&mut self, now: Time) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(&QueuedEvent { time, .. }) = self.queue.peek() {
            if *time > now.seconds() {
                break;
            }
            if let Some(qe) = self.queue.pop() {
                due.push(qe.event);
            }
        }
        due
    }

    /// Drops pending events for which `keep` returns false.
    pub fn retain<F: FnMut(&T) -> bool>(&mut self, mut keep: F) {
        let pending = mem::replace(&mut self.queue, BinaryHeap::new()).into_vec();
        self.queue = pending.into_iter().filter(|qe| keep(&qe.event)).collect();
    }

    pub fn next_time(&self) -> Option<Time> {
        self.queue.peek().map(|qe| Time::from_seconds(*qe.time))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[test]
fn test_ordering() {
    let mut p = BinaryHeap::new();
    p.push(QueuedEvent { time: OrderedFloat::from(123.0), id: 0, event: 0 });
    p.push(QueuedEvent { time: OrderedFloat::from(0.0), id: 1, event: 0 });
    p.push(QueuedEvent { time: OrderedFloat::from(122.0), id: 2, event: 0 });
    assert_eq!(*p.pop().unwrap().time, 0.0);
    assert_eq!(*p.pop().unwrap().time, 122.0);
    assert_eq!(*p.pop().unwrap().time, 123.0);
}

#[test]
fn test_pop_due() {
    let mut s = Scheduler::new();
    s.schedule(Time::from_seconds(10.0), "b");
    s.schedule(Time::from_seconds(5.0), "a");
    s.schedule(Time::from_seconds(10.0), "c");
    s.schedule(Time::from_seconds(20.0), "d");
    assert_eq!(s.pop_due(Time::from_seconds(4.0)), Vec::<&str>::new());
    assert_eq!(s.pop_due(Time::from_seconds(10.0)), vec!["a", "b", "c"]);
    s.retain(|e| *e != "d");
    assert!(s.is_empty());
    assert_eq!(s.next_time(), None);
}
