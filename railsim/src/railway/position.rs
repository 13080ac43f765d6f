//! Directed positions on the track.
//!
//! A position is `position_on_ti` meters from the end of `track_item`
//! that touches `previous_item`. Every physical point therefore has two
//! positions, one per direction of travel; `reversed` converts between
//! them.

use super::infrastructure::Infrastructure;
use super::trackitem::{ItemId, PointDirection, TopologyError, TrackItem};
use crate::input::{de_id, de_opt_id};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "trackItem", deserialize_with = "de_id")]
    pub track_item: ItemId,
    #[serde(rename = "previousTI", default, deserialize_with = "de_opt_id")]
    pub previous_item: Option<ItemId>,
    #[serde(rename = "positionOnTI", default)]
    pub position_on_ti: f64,
    /// The item walked before `previous_item`, when known. Resolves
    /// `previous` when `previous_item` is points trailed through.
    #[serde(skip)]
    behind: Option<ItemId>,
}

/// Branches trailed through, as (points, branch) pairs, oldest first.
pub type Trail = [(ItemId, ItemId)];

impl PartialEq for Position {
    fn eq(&self, other: &Position) -> bool {
        self.track_item == other.track_item
            && self.previous_item == other.previous_item
            && self.position_on_ti == other.position_on_ti
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {:.2})",
               self.track_item,
               self.previous_item.as_ref().map(String::as_str).unwrap_or("-"),
               self.position_on_ti)
    }
}

impl Position {
    pub fn new(track_item: &str, previous_item: Option<&str>, position_on_ti: f64) -> Position {
        Position {
            track_item: track_item.to_string(),
            previous_item: previous_item.map(String::from),
            position_on_ti,
            behind: None,
        }
    }

    fn previous_ref(&self) -> Option<&str> {
        self.previous_item.as_ref().map(String::as_str)
    }

    /// True when the position has left the scenery through an end item.
    pub fn is_out(&self, inf: &Infrastructure) -> bool {
        match inf.items.get(&self.track_item) {
            Some(TrackItem::End(_)) => self.previous_item.is_some(),
            _ => false,
        }
    }

    /// Start of the following item.
    pub fn next(&self, inf: &Infrastructure, dir: PointDirection) -> Result<Position, TopologyError> {
        let next = inf
            .following_item(&self.track_item, self.previous_ref(), dir)?
            .ok_or_else(|| TopologyError::EndOfLine(self.track_item.clone()))?;
        Ok(Position {
            track_item: next,
            previous_item: Some(self.track_item.clone()),
            position_on_ti: 0.0,
            behind: self.previous_item.clone(),
        })
    }

    /// End of the preceding item, in the same direction.
    pub fn previous(&self, inf: &Infrastructure) -> Result<Position, TopologyError> {
        self.previous_via(inf, self.behind.as_ref().map(String::as_str))
    }

    /// Like `previous`, with `branch` naming the branch of the preceding
    /// item when it is points reached through their common end. Without
    /// a valid branch the points' current direction decides.
    pub fn previous_via(&self, inf: &Infrastructure, branch: Option<&str>) -> Result<Position, TopologyError> {
        let prev = self
            .previous_item
            .as_ref()
            .ok_or_else(|| TopologyError::EndOfLine(self.track_item.clone()))?;
        let trailed = match inf.items.get(prev) {
            Some(points @ TrackItem::Points(_)) if points.previous_id() == Some(self.track_item.as_str()) => {
                branch.filter(|b| points.next_id() == Some(*b) || points.reverse_id() == Some(*b))
            }
            _ => None,
        };
        let before = match trailed {
            Some(b) => Some(b.to_string()),
            None => inf.following_item(prev, Some(&self.track_item), PointDirection::Current)?,
        };
        Ok(Position {
            track_item: prev.clone(),
            previous_item: before,
            position_on_ti: inf.real_length(prev)?,
            behind: None,
        })
    }

    /// Same point, facing the other way.
    pub fn reversed(&self, inf: &Infrastructure) -> Result<Position, TopologyError> {
        let ahead = inf.following_item(&self.track_item, self.previous_ref(), PointDirection::Current)?;
        Ok(Position {
            track_item: self.track_item.clone(),
            previous_item: ahead,
            position_on_ti: inf.real_length(&self.track_item)? - self.position_on_ti,
            behind: None,
        })
    }

    /// The position `length` meters ahead, or behind for negative values.
    pub fn add(&self, inf: &Infrastructure, length: f64) -> Result<Position, TopologyError> {
        self.add_along(inf, length, &[])
    }

    /// Like `add`, but walking backwards through trailed points takes
    /// the branch recorded in `trail`.
    pub fn add_along(&self, inf: &Infrastructure, length: f64, trail: &Trail) -> Result<Position, TopologyError> {
        let mut pos = self.clone();
        let mut remaining = length;
        loop {
            let item_length = inf.real_length(&pos.track_item)?;
            if remaining >= 0.0 {
                if pos.position_on_ti + remaining <= item_length {
                    pos.position_on_ti += remaining;
                    return Ok(pos);
                }
                remaining -= item_length - pos.position_on_ti;
                pos = pos.next(inf, PointDirection::Current)?;
            } else {
                if pos.position_on_ti + remaining >= 0.0 {
                    pos.position_on_ti += remaining;
                    return Ok(pos);
                }
                remaining += pos.position_on_ti;
                let branch = pos.behind.clone().or_else(|| {
                    trail
                        .iter()
                        .rev()
                        .find(|(points, _)| pos.previous_item.as_ref() == Some(points))
                        .map(|(_, branch)| branch.clone())
                });
                pos = pos.previous_via(inf, branch.as_ref().map(String::as_str))?;
            }
        }
    }

    /// Distance from `orig` forward to `self`.
    pub fn sub(&self, inf: &Infrastructure, orig: &Position) -> Result<f64, TopologyError> {
        self.distance_from(inf, orig, std::f64::INFINITY)?
            .ok_or(TopologyError::NotAhead)
    }

    /// Like `sub`, but gives up with `None` once more than `max` meters
    /// have been walked without reaching `self`.
    pub fn distance_from(&self, inf: &Infrastructure, orig: &Position, max: f64)
        -> Result<Option<f64>, TopologyError> {
        let mut cur = orig.clone();
        let mut walked = 0.0;
        for _ in 0..=inf.items.len() {
            if cur.track_item == self.track_item {
                if cur.previous_item != self.previous_item {
                    return Err(TopologyError::WrongDirection);
                }
                if cur.position_on_ti > self.position_on_ti {
                    return Err(TopologyError::NotAhead);
                }
                return Ok(Some(walked + self.position_on_ti - cur.position_on_ti));
            }
            if cur.is_out(inf) || walked > max {
                return Ok(None);
            }
            walked += inf.real_length(&cur.track_item)? - cur.position_on_ti;
            cur = cur.next(inf, PointDirection::Current)?;
        }
        Ok(None)
    }

    /// Positions at the start of each item from `self` up to the item of
    /// `to`, both included. Each carries the item it was entered from.
    pub fn positions_to(&self, inf: &Infrastructure, to: &Position) -> Result<Vec<Position>, TopologyError> {
        let mut res = Vec::new();
        let mut cur = self.clone();
        for _ in 0..=inf.items.len() {
            if cur.track_item == to.track_item || cur.is_out(inf) {
                break;
            }
            res.push(cur.clone());
            cur = cur.next(inf, PointDirection::Current)?;
        }
        res.push(to.clone());
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::points::StandardPointsManager;
    use crate::railway::trackitem::{BasicItem, LineItem, PointsItem};
    use std::collections::BTreeMap;

    fn link(base: &mut crate::railway::trackitem::TrackStruct, id: &str, prev: Option<&str>, next: Option<&str>, len: f64) {
        base.id = id.to_string();
        base.previous_ti_id = prev.map(String::from);
        base.next_ti_id = next.map(String::from);
        base.real_length = len;
    }

    /// 1(end) - 2 - 3(points) - 4 - 5(end), with 3 reversing onto 6 - 7(end).
    fn infra() -> Infrastructure {
        let mut items = BTreeMap::new();
        let end = |id: &str, prev: &str| {
            let mut e = BasicItem::default();
            link(&mut e.base, id, Some(prev), None, 0.0);
            (id.to_string(), TrackItem::End(e))
        };
        let ends = vec![end("1", "2"), end("5", "4"), end("7", "6")];
        items.extend(ends);
        let line = |id: &str, prev: &str, next: &str, len: f64| {
            let mut l = LineItem::default();
            link(&mut l.base, id, Some(prev), Some(next), len);
            (id.to_string(), TrackItem::Line(l))
        };
        let lines = vec![line("2", "1", "3", 100.0), line("4", "3", "5", 200.0), line("6", "3", "7", 50.0)];
        items.extend(lines);
        let mut p = PointsItem::default();
        link(&mut p.base, "3", Some("2"), Some("4"), 10.0);
        p.reverse_ti_id = Some("6".to_string());
        items.insert("3".to_string(), TrackItem::Points(p));
        Infrastructure::new(items, BTreeMap::new(), Box::new(StandardPointsManager::new()), 20.0)
    }

    #[test]
    fn next_and_previous() {
        let inf = infra();
        let p = Position::new("2", Some("1"), 30.0);
        let n = p.next(&inf, PointDirection::Current).unwrap();
        assert_eq!(n, Position::new("3", Some("2"), 0.0));
        let back = n.previous(&inf).unwrap();
        assert_eq!(back.track_item, p.track_item);
        assert_eq!(back.previous_item, p.previous_item);
        assert_eq!(back.position_on_ti, 100.0);

        let r = n.next(&inf, PointDirection::Reversed).unwrap();
        assert_eq!(r, Position::new("6", Some("3"), 0.0));
        let n = n.next(&inf, PointDirection::Normal).unwrap();
        assert_eq!(n, Position::new("4", Some("3"), 0.0));
    }

    #[test]
    fn previous_through_trailed_points() {
        // Points 3 lie normal, so only the walked path tells 6 from 4.
        let inf = infra();
        let p = Position::new("3", Some("6"), 10.0);
        let n = p.next(&inf, PointDirection::Current).unwrap();
        assert_eq!(n, Position::new("2", Some("3"), 0.0));
        assert_eq!(n.previous(&inf).unwrap(), p);

        let from_branch = Position::new("6", Some("7"), 45.0);
        let ahead = from_branch.add(&inf, 20.0).unwrap();
        assert_eq!(ahead, Position::new("2", Some("3"), 5.0));
        assert_eq!(ahead.add(&inf, -20.0).unwrap(), from_branch);

        // Without memory, a recorded trail gives the branch.
        let fresh = Position::new("2", Some("3"), 5.0);
        assert_eq!(fresh.add(&inf, -20.0).unwrap(), Position::new("4", Some("5"), 195.0));
        let trail = vec![("3".to_string(), "6".to_string())];
        assert_eq!(fresh.add_along(&inf, -20.0, &trail).unwrap(), from_branch);
    }

    #[test]
    fn reversed_position() {
        let inf = infra();
        let p = Position::new("4", Some("3"), 20.0);
        let r = p.reversed(&inf).unwrap();
        assert_eq!(r, Position::new("4", Some("5"), 180.0));
        assert_eq!(r.reversed(&inf).unwrap(), p);
    }

    #[test]
    fn add_across_items() {
        let inf = infra();
        let p = Position::new("2", Some("1"), 90.0);
        assert_eq!(p.add(&inf, 5.0).unwrap(), Position::new("2", Some("1"), 95.0));
        assert_eq!(p.add(&inf, 25.0).unwrap(), Position::new("4", Some("3"), 5.0));
        let q = Position::new("4", Some("3"), 5.0);
        assert_eq!(q.add(&inf, -25.0).unwrap(), Position::new("2", Some("1"), 90.0));
        assert_eq!(q.add(&inf, 0.0).unwrap(), q);
    }

    #[test]
    fn sub_is_inverse_of_add() {
        let inf = infra();
        let a = Position::new("2", Some("1"), 12.0);
        let b = Position::new("4", Some("3"), 37.0);
        let d = b.sub(&inf, &a).unwrap();
        assert_eq!(d, 88.0 + 10.0 + 37.0);
        assert_eq!(a.add(&inf, d).unwrap(), b);

        match a.sub(&inf, &b) {
            Err(TopologyError::NotAhead) => {}
            x => panic!("unexpected {:?}", x),
        }
        let c = Position::new("4", Some("5"), 10.0);
        match c.sub(&inf, &b) {
            Err(TopologyError::WrongDirection) => {}
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn out_and_items_between() {
        let inf = infra();
        assert!(Position::new("5", Some("4"), 0.0).is_out(&inf));
        assert!(!Position::new("1", None, 0.0).is_out(&inf));
        let from = Position::new("2", Some("1"), 50.0);
        let to = Position::new("4", Some("3"), 10.0);
        let items: Vec<String> = from.positions_to(&inf, &to).unwrap().into_iter().map(|p| p.track_item).collect();
        assert_eq!(items, vec!["2", "3", "4"]);
    }

    #[test]
    fn end_item_start() {
        // A tail left behind on the entry end item walks back onto the line.
        let inf = infra();
        let p = Position::new("1", None, 0.0);
        assert_eq!(p.next(&inf, PointDirection::Current).unwrap(), Position::new("2", Some("1"), 0.0));
    }
}
