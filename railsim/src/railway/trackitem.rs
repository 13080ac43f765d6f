//! Track items: the static pieces of scenery and how they link together.

use crate::input::{de_opt_id, de_or_default};
use crate::primitives::Point;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

pub type ItemId = String;

/// End items stand for the rest of the world beyond the scenery.
pub const END_ITEM_LENGTH: f64 = 1.0e9;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PointDirection {
    /// Whatever the points are currently set to.
    Current,
    Normal,
    Reversed,
    /// Points are moving.
    Unknown,
}

impl Default for PointDirection {
    fn default() -> Self {
        PointDirection::Normal
    }
}

impl Serialize for PointDirection {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            PointDirection::Reversed => s.serialize_u8(1),
            _ => s.serialize_u8(0),
        }
    }
}

impl<'de> Deserialize<'de> for PointDirection {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<PointDirection, D::Error> {
        match u8::deserialize(d)? {
            0 => Ok(PointDirection::Normal),
            1 => Ok(PointDirection::Reversed),
            x => Err(de::Error::custom(format!("invalid points direction {}", x))),
        }
    }
}

#[derive(Debug, Fail)]
pub enum TopologyError {
    #[fail(display = "unknown TrackItem {}", _0)]
    UnknownItem(ItemId),
    #[fail(display = "TrackItem {} is not linked at {}", item, at)]
    NotLinkedAt { item: ItemId, at: Point },
    #[fail(display = "inconsistent link at {} between {} and {}", at, item1, item2)]
    InconsistentLink { at: Point, item1: ItemId, item2: ItemId },
    #[fail(display = "TrackItems {} and {} are not linked", _0, _1)]
    NotLinked(ItemId, String),
    #[fail(display = "no TrackItem beyond {}", _0)]
    EndOfLine(ItemId),
    #[fail(display = "position is not in the same direction as orig")]
    WrongDirection,
    #[fail(display = "position is not ahead of orig")]
    NotAhead,
}

/// Fields shared by every kind of track item.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStruct {
    #[serde(skip)]
    pub id: ItemId,
    #[serde(default, deserialize_with = "de_or_default")]
    pub name: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub next_ti_id: Option<ItemId>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub previous_ti_id: Option<ItemId>,
    #[serde(default)]
    pub max_speed: f64,
    #[serde(default)]
    pub real_length: f64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub conflict_ti_id: Option<ItemId>,
    #[serde(default, deserialize_with = "de_or_default")]
    pub custom_properties: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub place_code: Option<String>,
    #[serde(default, deserialize_with = "de_or_default")]
    pub track_code: String,
}

impl TrackStruct {
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Line, InvisibleLink and Platform items.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(flatten)]
    pub base: TrackStruct,
    #[serde(default)]
    pub xf: f64,
    #[serde(default)]
    pub yf: f64,
}

/// End, Text and Place items carry nothing beyond the common fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BasicItem {
    #[serde(flatten)]
    pub base: TrackStruct,
}

pub type Place = BasicItem;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalItem {
    #[serde(flatten)]
    pub base: TrackStruct,
    #[serde(default)]
    pub xn: f64,
    #[serde(default)]
    pub yn: f64,
    #[serde(default, deserialize_with = "de_or_default")]
    pub signal_type: String,
    #[serde(default)]
    pub reverse: bool,
    #[serde(rename = "trainID", default, deserialize_with = "de_or_default")]
    pub train_id: String,
}

/// A switch. `previous` is the common end, `next` the normal branch and
/// `reverse` the diverging branch. End coordinates are offsets from the
/// centre of the points.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsItem {
    #[serde(flatten)]
    pub base: TrackStruct,
    #[serde(default)]
    pub xf: f64,
    #[serde(default)]
    pub yf: f64,
    #[serde(default)]
    pub xn: f64,
    #[serde(default)]
    pub yn: f64,
    #[serde(default)]
    pub xr: f64,
    #[serde(default)]
    pub yr: f64,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub reverse_ti_id: Option<ItemId>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub paired_ti_id: Option<ItemId>,
}

impl PointsItem {
    pub fn common_end(&self) -> Point {
        self.base.origin().add(Point::new(self.xf, self.yf))
    }

    pub fn normal_end(&self) -> Point {
        self.base.origin().add(Point::new(self.xn, self.yn))
    }

    pub fn reverse_end(&self) -> Point {
        self.base.origin().add(Point::new(self.xr, self.yr))
    }
}

#[derive(Clone, Debug)]
pub enum TrackItem {
    Line(LineItem),
    InvisibleLink(LineItem),
    Platform(LineItem),
    End(BasicItem),
    Text(BasicItem),
    Signal(SignalItem),
    Points(PointsItem),
}

impl TrackItem {
    /// The `__type__` discriminator used in scenario files.
    pub fn type_name(&self) -> &'static str {
        match self {
            TrackItem::Line(_) => "LineItem",
            TrackItem::InvisibleLink(_) => "InvisibleLinkItem",
            TrackItem::Platform(_) => "PlatformItem",
            TrackItem::End(_) => "EndItem",
            TrackItem::Text(_) => "TextItem",
            TrackItem::Signal(_) => "SignalItem",
            TrackItem::Points(_) => "PointsItem",
        }
    }

    pub fn base(&self) -> &TrackStruct {
        match self {
            TrackItem::Line(i) | TrackItem::InvisibleLink(i) | TrackItem::Platform(i) => &i.base,
            TrackItem::End(i) | TrackItem::Text(i) => &i.base,
            TrackItem::Signal(i) => &i.base,
            TrackItem::Points(i) => &i.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut TrackStruct {
        match self {
            TrackItem::Line(i) | TrackItem::InvisibleLink(i) | TrackItem::Platform(i) => &mut i.base,
            TrackItem::End(i) | TrackItem::Text(i) => &mut i.base,
            TrackItem::Signal(i) => &mut i.base,
            TrackItem::Points(i) => &mut i.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn real_length(&self) -> f64 {
        match self {
            TrackItem::End(_) => END_ITEM_LENGTH,
            _ => self.base().real_length,
        }
    }

    pub fn as_signal(&self) -> Option<&SignalItem> {
        match self {
            TrackItem::Signal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_points(&self) -> Option<&PointsItem> {
        match self {
            TrackItem::Points(p) => Some(p),
            _ => None,
        }
    }

    /// Items a train can stop on at a place.
    pub fn is_line(&self) -> bool {
        match self {
            TrackItem::Line(_) | TrackItem::InvisibleLink(_) => true,
            _ => false,
        }
    }

    /// True for the track items a train stops or passes on when calling
    /// at `place`.
    pub fn is_at_place(&self, place: &str) -> bool {
        self.is_line() && self.base().place_code.as_ref().map(String::as_str) == Some(place)
    }

    pub fn next_id(&self) -> Option<&str> {
        self.base().next_ti_id.as_ref().map(String::as_str)
    }

    pub fn previous_id(&self) -> Option<&str> {
        self.base().previous_ti_id.as_ref().map(String::as_str)
    }

    pub fn reverse_id(&self) -> Option<&str> {
        self.as_points().and_then(|p| p.reverse_ti_id.as_ref().map(String::as_str))
    }

    pub fn origin(&self) -> Point {
        match self {
            TrackItem::Points(p) => p.common_end(),
            _ => self.base().origin(),
        }
    }

    /// Far end of the item, used to locate link errors.
    pub fn end(&self) -> Point {
        match self {
            TrackItem::Line(i) | TrackItem::InvisibleLink(i) | TrackItem::Platform(i) => Point::new(i.xf, i.yf),
            TrackItem::Points(p) => p.normal_end(),
            _ => self.base().origin(),
        }
    }

    /// True if `other` is one of this item's neighbours.
    pub fn is_connected(&self, other: &str) -> bool {
        let o = Some(other);
        self.previous_id() == o || self.next_id() == o || self.reverse_id() == o
    }

    /// The item on the other side of this one when arriving from
    /// `preceding`. `dir` only matters for points entered at the common
    /// end; `Current` must already have been resolved by the caller and
    /// anything but `Reversed` takes the normal branch.
    pub fn following_item(&self, preceding: Option<&str>, dir: PointDirection) -> Result<Option<ItemId>, TopologyError> {
        let not_linked = || TopologyError::NotLinked(self.id().to_string(), preceding.unwrap_or("").to_string());
        if let TrackItem::Points(p) = self {
            if preceding.is_some() && (preceding == self.reverse_id() || preceding == self.next_id()) {
                return Ok(p.base.previous_ti_id.clone());
            }
            if preceding.is_some() && preceding == self.previous_id() {
                return Ok(match dir {
                    PointDirection::Reversed => p.reverse_ti_id.clone(),
                    _ => p.base.next_ti_id.clone(),
                });
            }
            return Err(not_linked());
        }
        if preceding == self.previous_id() {
            Ok(self.base().next_ti_id.clone())
        } else if preceding == self.next_id() {
            Ok(self.base().previous_ti_id.clone())
        } else {
            Err(not_linked())
        }
    }
}

/// Verifies that every linked item links back. Place, Platform and Text
/// items are decorative and are not checked.
pub fn check_links(items: &BTreeMap<ItemId, TrackItem>) -> Result<(), TopologyError> {
    let check = |item: &TrackItem, link: Option<&str>, at: Point| -> Result<(), TopologyError> {
        let other = link.and_then(|id| items.get(id));
        match other {
            None => Err(TopologyError::NotLinkedAt { item: item.id().to_string(), at }),
            Some(other) if !other.is_connected(item.id()) => Err(TopologyError::InconsistentLink {
                at,
                item1: item.id().to_string(),
                item2: other.id().to_string(),
            }),
            Some(_) => Ok(()),
        }
    };
    for item in items.values() {
        match item {
            TrackItem::Platform(_) | TrackItem::Text(_) => continue,
            TrackItem::Points(p) => {
                check(item, item.reverse_id(), p.reverse_end())?;
                check(item, item.next_id(), item.end())?;
            }
            TrackItem::Line(_) | TrackItem::InvisibleLink(_) | TrackItem::Signal(_) => {
                check(item, item.next_id(), item.end())?;
            }
            TrackItem::End(_) => {}
        }
        check(item, item.previous_id(), item.origin())?;
    }
    Ok(())
}
