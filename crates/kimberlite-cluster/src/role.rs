//! Role enumeration and the role <-> BGP community mapping.

use std::fmt;

/// A role in the cluster's role-election state machine.
///
/// `Initial` only ever exists before the first tick. `Anchor` is never
/// adopted by this controller: it appears only as a neighbor's role, a
/// stand-in for non-controller members of the routed network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initial,
    Fault,
    Candidate,
    Primary,
    Replica,
    Anchor,
}

impl Role {
    /// Lowercased name, as used by the `/status` HTTP endpoint and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Initial => "initial",
            Role::Fault => "fault",
            Role::Candidate => "candidate",
            Role::Primary => "primary",
            Role::Replica => "replica",
            Role::Anchor => "anchor",
        }
    }

    /// The four roles a neighbor can meaningfully claim plus `Anchor`,
    /// used to build [`crate::neighbor::NeighborSet`] buckets and to check
    /// for network partition.
    pub const OBSERVABLE: [Role; 5] = [
        Role::Fault,
        Role::Candidate,
        Role::Primary,
        Role::Replica,
        Role::Anchor,
    ];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ASN under which this controller's own communities are defined.
pub const CONTROLLER_ASN: u16 = 65000;

/// A BGP community, encoded per RFC 1997 as `(asn << 16) | value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Community(u32);

impl Community {
    /// Builds a community from its `asn:value` parts.
    pub fn new(asn: u16, value: u16) -> Self {
        Community((u32::from(asn) << 16) | u32::from(value))
    }

    /// Builds a community from its raw 32-bit wire value.
    pub fn from_raw(raw: u32) -> Self {
        Community(raw)
    }

    /// The raw 32-bit wire value.
    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn asn(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn value(self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asn(), self.value())
    }
}

/// Returns the community this controller advertises when it holds `role`,
/// or `None` if the role has no advertisement (`Initial`, `Anchor`).
pub fn community_for_role(role: Role) -> Option<Community> {
    match role {
        Role::Fault => Some(Community::new(CONTROLLER_ASN, 1)),
        Role::Candidate => Some(Community::new(CONTROLLER_ASN, 2)),
        Role::Primary => Some(Community::new(CONTROLLER_ASN, 3)),
        Role::Replica => Some(Community::new(CONTROLLER_ASN, 4)),
        Role::Anchor => Some(Community::new(CONTROLLER_ASN, 10)),
        Role::Initial => None,
    }
}

/// Returns the role a received community decodes to, or `None` if the
/// community is not one of the five known communities. Unknown communities
/// are not an error: the caller logs and skips the route.
pub fn role_for_community(community: Community) -> Option<Role> {
    if community.asn() != CONTROLLER_ASN {
        return None;
    }
    match community.value() {
        1 => Some(Role::Fault),
        2 => Some(Role::Candidate),
        3 => Some(Role::Primary),
        4 => Some(Role::Replica),
        10 => Some(Role::Anchor),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn community_round_trip_is_bijective() {
        for role in [
            Role::Fault,
            Role::Candidate,
            Role::Primary,
            Role::Replica,
            Role::Anchor,
        ] {
            let community = community_for_role(role).expect("role has a community");
            assert_eq!(role_for_community(community), Some(role));
        }
    }

    #[test]
    fn initial_has_no_community() {
        assert_eq!(community_for_role(Role::Initial), None);
    }

    #[test]
    fn unknown_community_decodes_to_none() {
        let unknown = Community::new(CONTROLLER_ASN, 99);
        assert_eq!(role_for_community(unknown), None);
    }

    #[test]
    fn foreign_asn_decodes_to_none() {
        let foreign = Community::new(65001, 3);
        assert_eq!(role_for_community(foreign), None);
    }

    #[test]
    fn display_matches_asn_colon_value() {
        assert_eq!(Community::new(65000, 3).to_string(), "65000:3");
    }
}
