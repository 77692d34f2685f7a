pub mod square_serde {
    use std::str::FromStr;

    use serde::{
        de::{Error, Visitor},
        Deserializer, Serializer,
    };
    use shakmaty::Square;

    pub fn serialize<S: Serializer>(sq: &Square, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&sq.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Square, D::Error> {
        d.deserialize_str(SquareVisitor {})
    }

    struct SquareVisitor {}
    impl<'de> Visitor<'de> for SquareVisitor {
        type Value = Square;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "a square such as \"e4\"")
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Square::from_str(v).map_err(|_| Error::custom(format!("not a square: {v:?}")))
        }
    }

    pub mod option {
        use serde::{Serialize, Serializer};
        use shakmaty::Square;

        pub fn serialize<S: Serializer>(sq: &Option<Square>, ser: S) -> Result<S::Ok, S::Error> {
            sq.map(|sq| sq.to_string()).serialize(ser)
        }
    }

    pub mod seq {
        use serde::{ser::SerializeSeq, Serializer};
        use shakmaty::Square;

        pub fn serialize<S: Serializer>(squares: &[Square], ser: S) -> Result<S::Ok, S::Error> {
            let mut seq = ser.serialize_seq(Some(squares.len()))?;
            for sq in squares {
                seq.serialize_element(&sq.to_string())?;
            }
            seq.end()
        }
    }
}

pub mod role_serde {
    use serde::{
        de::{Error, Visitor},
        Deserializer, Serializer,
    };
    use shakmaty::Role;

    pub fn serialize<S: Serializer>(r: &Role, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_char(r.char())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Role, D::Error> {
        struct RoleVisitor {}
        impl<'de> Visitor<'de> for RoleVisitor {
            type Value = Role;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "a piece letter such as \"q\"")
            }
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Role::from_char(c.to_ascii_lowercase())
                        .ok_or_else(|| Error::custom(format!("not a piece: {v:?}"))),
                    _ => Err(Error::custom(format!("not a piece: {v:?}"))),
                }
            }
            fn visit_char<E>(self, v: char) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(v.encode_utf8(&mut [0; 4]))
            }
        }
        d.deserialize_str(RoleVisitor {})
    }

    pub mod seq {
        use serde::{ser::SerializeSeq, Serializer};
        use shakmaty::Role;

        pub fn serialize<S: Serializer>(roles: &[Role], ser: S) -> Result<S::Ok, S::Error> {
            let mut seq = ser.serialize_seq(Some(roles.len()))?;
            for r in roles {
                seq.serialize_element(&r.char())?;
            }
            seq.end()
        }
    }
}

pub mod color_serde {
    use serde::{
        de::{Error, Visitor},
        Deserializer, Serializer,
    };
    use shakmaty::Color;

    pub fn serialize<S: Serializer>(c: &Color, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(match c {
            Color::White => "white",
            Color::Black => "black",
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Color, D::Error> {
        struct ColorVisitor {}
        impl<'de> Visitor<'de> for ColorVisitor {
            type Value = Color;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "\"white\" or \"black\"")
            }
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    "white" | "w" => Ok(Color::White),
                    "black" | "b" => Ok(Color::Black),
                    _ => Err(Error::custom(format!("not a side: {v:?}"))),
                }
            }
        }
        d.deserialize_str(ColorVisitor {})
    }

    pub mod option {
        use serde::{Deserialize, Deserializer};
        use shakmaty::Color;

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Color>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapped(#[serde(with = "super")] Color);
            Ok(Option::<Wrapped>::deserialize(d)?.map(|Wrapped(c)| c))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use shakmaty::{Color, Role, Square};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Sample {
        #[serde(with = "super::square_serde")]
        square: Square,
        #[serde(with = "super::role_serde")]
        role: Role,
        #[serde(with = "super::color_serde")]
        side: Color,
    }

    #[test]
    fn readable_json() {
        let sample = Sample {
            square: Square::E4,
            role: Role::Knight,
            side: Color::Black,
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"square":"e4","role":"n","side":"black"}"#);
        assert_eq!(serde_json::from_str::<Sample>(&json).unwrap(), sample);
    }

    #[test]
    fn rejects_nonsense() {
        assert!(
            serde_json::from_str::<Sample>(r#"{"square":"i9","role":"n","side":"w"}"#).is_err()
        );
        assert!(
            serde_json::from_str::<Sample>(r#"{"square":"a1","role":"x","side":"w"}"#).is_err()
        );
    }
}
