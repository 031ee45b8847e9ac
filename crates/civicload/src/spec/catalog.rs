//! Built-in dataset catalog
//!
//! Column layouts of the city open-data extracts (property assessments,
//! permits, licenses, code-violation investigations) plus the entity/address
//! resolution tables derived from them. Ordinals are 1-based positions in the
//! exported CSV; geometry columns are dropped.
//!
//! The order of [`datasets`] is the load order: small, independent tables
//! first, the entity/address association table last.

use super::{CastRule, TableSpec};

pub fn datasets() -> Vec<TableSpec> {
    vec![
        demolitions(),
        appeals(),
        business_licenses(),
        commercial_activity_licenses(),
        opa_properties(),
        master_address(),
        master_entity(),
        case_investigations(),
        assessments(),
        master_entity_address(),
    ]
}

fn demolitions() -> TableSpec {
    TableSpec::builder("dbo.philly_demolitions.csv", "demolitions")
        .column(1, "address", 200)
        .column(2, "addressobjectid", 20)
        .column(3, "applicantname", 200)
        .column(4, "applicanttype", 50)
        .column(5, "cartodb_id", 20)
        .column(6, "caseorpermitnumber", 30)
        .column(7, "censustract", 20)
        .column(8, "city_demo", 5)
        .column(9, "completed_date", 50)
        .column(10, "contractoraddress1", 200)
        .column(11, "contractoraddress2", 200)
        .column(12, "contractorcity", 100)
        .column(13, "contractorname", 200)
        .column(14, "contractorstate", 10)
        .column(15, "contractortype", 20)
        .column(16, "contractorzip", 20)
        .column(17, "council_district", 10)
        .column(18, "geocode_x", 50)
        .column(19, "geocode_y", 50)
        .column(20, "mostrecentinsp", 50)
        .column(21, "objectid", 20)
        .column(22, "opa_account_num", 20)
        .column(23, "opa_owner", 200)
        .column(24, "parcel_id_num", 20)
        .column(25, "posse_jobid", 20)
        .column(26, "record_type", 30)
        .column(27, "start_date", 50)
        .column(28, "status", 50)
        .column(29, "systemofrecord", 20)
        .skip(30) // the_geom
        .skip(31) // the_geom_webmercator
        .column(32, "typeofwork", 30)
        .column(33, "typeofworkdescription", 100)
        .column(34, "unit_num", 20)
        .column(35, "unit_type", 20)
        .column(36, "zip", 20)
        .cast_all(&["objectid", "cartodb_id"], CastRule::Int)
        .cast_all(&["geocode_x", "geocode_y"], CastRule::Float)
        .cast_all(&["completed_date", "mostrecentinsp", "start_date"], CastRule::Timestamp)
        .primary_key("objectid")
        .build()
}

fn appeals() -> TableSpec {
    TableSpec::builder("dbo.philly_appeals.csv", "appeals")
        .column(1, "acceleratedappeal", 30)
        .column(2, "address", 200)
        .column(3, "addressobjectid", 20)
        .column_max(4, "agendadescription")
        .column_max(5, "appealgrounds")
        .column(6, "appealnumber", 30)
        .column(7, "appealstatus", 20)
        .column(8, "appealtype", 100)
        .column(9, "appellanttype", 30)
        .column(10, "applicationtype", 100)
        .column(11, "cartodb_id", 20)
        .column(12, "censustract", 20)
        .column(13, "completeddate", 50)
        .column(14, "council_district", 5)
        .column(15, "createddate", 50)
        .column(16, "decision", 50)
        .column(17, "decisiondate", 50)
        .column(18, "geocode_x", 50)
        .column(19, "geocode_y", 50)
        .column(20, "internaljobid", 20)
        .column(21, "meetingnumber", 30)
        .column(22, "meetingresult", 50)
        .column(23, "objectid", 20)
        .column(24, "opa_account_num", 20)
        .column(25, "opa_owner", 200)
        .column(26, "parcel_id_num", 20)
        .column(27, "posse_jobid", 20)
        .column(28, "primaryappellant", 200)
        .column_max(29, "proviso")
        .column(30, "relatedcasefile", 30)
        .column(31, "relatedpermit", 30)
        .column(32, "scheduleddate", 50)
        .column(33, "systemofrecord", 20)
        .skip(34) // the_geom
        .skip(35) // the_geom_webmercator
        .column(36, "unit_num", 20)
        .column(37, "unit_type", 20)
        .column(38, "zip", 20)
        .cast_all(&["cartodb_id", "objectid"], CastRule::Int)
        .cast_all(&["geocode_x", "geocode_y"], CastRule::Float)
        .cast_all(
            &[
                "completeddate",
                "createddate",
                "decisiondate",
                "scheduleddate",
            ],
            CastRule::Timestamp,
        )
        .primary_key("appealnumber")
        .build()
}

fn business_licenses() -> TableSpec {
    TableSpec::builder("dbo.philly_business_licenses.csv", "business_licenses")
        .column(1, "address", 200)
        .column(2, "addressed_license", 10)
        .column(3, "addressobjectid", 20)
        .column(4, "business_mailing_address", 500)
        .column(5, "business_name", 300)
        .column(6, "cartodb_id", 20)
        .column(7, "censustract", 20)
        .column(8, "council_district", 5)
        .column(9, "expirationdate", 50)
        .column(10, "geocode_x", 50)
        .column(11, "geocode_y", 50)
        .column(12, "inactivedate", 50)
        .column(13, "initialissuedate", 50)
        .column(14, "legalentitytype", 20)
        .column(15, "legalfirstname", 100)
        .column(16, "legallastname", 100)
        .column(17, "legalname", 300)
        .column(18, "licensenum", 20)
        .column(19, "licensestatus", 20)
        .column(20, "licensetype", 100)
        .column(21, "mostrecentissuedate", 50)
        .column(22, "numberofunits", 20)
        .column(23, "objectid", 20)
        .column(24, "opa_account_num", 20)
        .column(25, "opa_owner", 200)
        .column(26, "ownercontact1city", 100)
        .column(27, "ownercontact1mailingaddress", 500)
        .column(28, "ownercontact1name", 200)
        .column(29, "ownercontact1state", 10)
        .column(30, "ownercontact1zippostalcode", 20)
        .column(31, "ownercontact2city", 100)
        .column(32, "ownercontact2mailingaddress", 500)
        .column(33, "ownercontact2name", 200)
        .column(34, "ownercontact2state", 10)
        .column(35, "ownercontact2zippostalcode", 20)
        .column(36, "owneroccupied", 10)
        .column(37, "parcel_id_num", 20)
        .column(38, "posse_jobid", 20)
        .column(39, "rentalcategory", 50)
        .column(40, "revenuecode", 10)
        .skip(41) // the_geom
        .skip(42) // the_geom_webmercator
        .column(43, "unit_num", 20)
        .column(44, "unit_type", 20)
        .column(45, "zip", 20)
        .cast_all(&["cartodb_id", "objectid", "numberofunits"], CastRule::Int)
        .cast_all(&["geocode_x", "geocode_y"], CastRule::Float)
        .cast_all(
            &[
                "expirationdate",
                "inactivedate",
                "initialissuedate",
                "mostrecentissuedate",
            ],
            CastRule::Timestamp,
        )
        .primary_key("licensenum")
        .build()
}

fn commercial_activity_licenses() -> TableSpec {
    TableSpec::builder("dbo.philly_com_act_licenses.csv", "commercial_activity_licenses")
        .column(1, "cartodb_id", 20)
        .column(2, "companyname", 300)
        .column(3, "issuedate", 50)
        .column(4, "legalentitytype", 20)
        .column(5, "legalfirstname", 100)
        .column(6, "legallastname", 100)
        .column(7, "licensenum", 20)
        .column(8, "licensestatus", 20)
        .column(9, "licensetype", 50)
        .column(10, "objectid", 20)
        .column(11, "ownercontact1city", 100)
        .column(12, "ownercontact1mailingaddress", 500)
        .column(13, "ownercontact1name", 200)
        .column(14, "ownercontact1state", 10)
        .column(15, "ownercontact1zippostalcode", 20)
        .column(16, "ownercontact2city", 100)
        .column(17, "ownercontact2mailingaddress", 500)
        .column(18, "ownercontact2name", 200)
        .column(19, "ownercontact2state", 10)
        .column(20, "ownercontact2zippostalcode", 20)
        .column(21, "posse_jobid", 20)
        .column(22, "revenuecode", 10)
        .skip(23) // the_geom
        .skip(24) // the_geom_webmercator
        .cast_all(&["cartodb_id", "objectid"], CastRule::Int)
        .cast("issuedate", CastRule::Timestamp)
        .primary_key("licensenum")
        .build()
}

fn opa_properties() -> TableSpec {
    TableSpec::builder("dbo.philly_opa_properties_public_pde.csv", "opa_properties")
        .column(1, "address_std", 200)
        .column(2, "assessment_date", 50)
        .column(3, "basements", 50)
        .column(4, "beginning_point", 200)
        .column(5, "book_and_page", 20)
        .column(6, "building_code", 10)
        .column(7, "building_code_description", 100)
        .column(8, "building_code_description_new", 100)
        .column(9, "building_code_new", 10)
        .skip(10) // cartodb_id
        .column(11, "category_code", 10)
        .column(12, "category_code_description", 50)
        .column(13, "census_tract", 20)
        .column(14, "central_air", 5)
        .column(15, "council_district_2016", 5)
        .column(16, "council_district_2024", 5)
        .column(17, "cross_reference", 20)
        .column(18, "date_exterior_condition", 50)
        .column(19, "depth", 50)
        .column(20, "elementary_school", 100)
        .column(21, "exempt_building", 50)
        .column(22, "exempt_land", 50)
        .column(23, "exterior_condition", 10)
        .column(24, "fireplaces", 20)
        .column(25, "frontage", 50)
        .column(26, "garage_spaces", 20)
        .column(27, "garage_type", 20)
        .column(28, "general_construction", 50)
        .column(29, "geocode_lat", 50)
        .column(30, "geocode_lon", 50)
        .column(31, "high_school", 100)
        .column(32, "homestead_exemption", 20)
        .column(33, "house_extension", 10)
        .column(34, "house_number", 20)
        .column(35, "interior_condition", 10)
        .column(36, "li_district", 50)
        .column(37, "location", 200)
        .column(38, "mailing_address_1", 200)
        .column(39, "mailing_address_2", 200)
        .column(40, "mailing_care_of", 200)
        .column(41, "mailing_city_state", 100)
        .column(42, "mailing_street", 200)
        .column(43, "mailing_zip", 20)
        .column(44, "market_value", 50)
        .column(45, "market_value_date", 50)
        .column(46, "middle_school", 100)
        .column(47, "number_of_bathrooms", 20)
        .column(48, "number_of_bedrooms", 20)
        .column(49, "number_of_rooms", 20)
        .column(50, "number_stories", 20)
        .skip(51) // objectid
        .column(52, "off_street_open", 20)
        .column(53, "other_building", 50)
        .column(54, "owner_1", 200)
        .column(55, "owner_2", 200)
        .column(56, "parcel_number", 20)
        .column(57, "parcel_shape", 5)
        .column(58, "pin", 20)
        .column(59, "police_district", 10)
        .column(60, "political_district", 10)
        .column(61, "political_ward", 10)
        .column(62, "pwd_parcel_id", 20)
        .column(63, "quality_grade", 10)
        .column(64, "recording_date", 50)
        .column(65, "registry_number", 30)
        .column(66, "rubbish_recycle_day", 10)
        .column(67, "sale_date", 50)
        .column(68, "sale_price", 50)
        .column(69, "separate_utilities", 10)
        .column(70, "site_type", 10)
        .column(71, "state_code", 10)
        .column(72, "street_code", 10)
        .column(73, "street_designation", 10)
        .column(74, "street_direction", 5)
        .column(75, "street_name", 50)
        .column(76, "suffix", 10)
        .column(77, "taxable_building", 50)
        .column(78, "taxable_land", 50)
        .skip(79) // the_geom
        .skip(80) // the_geom_webmercator
        .column(81, "topography", 10)
        .column(82, "total_area", 50)
        .column(83, "total_livable_area", 50)
        .column(84, "type_heater", 10)
        .column(85, "unfinished", 10)
        .column(86, "unit", 20)
        .column(87, "view_type", 10)
        .column(88, "year_built", 10)
        .column(89, "year_built_estimate", 10)
        .column(90, "zip_code", 20)
        .column(91, "zoning", 20)
        .cast_all(
            &[
                "assessment_date",
                "date_exterior_condition",
                "market_value_date",
                "recording_date",
                "sale_date",
            ],
            CastRule::Timestamp,
        )
        .cast_all(
            &[
                "depth",
                "frontage",
                "geocode_lat",
                "geocode_lon",
                "number_stories",
                "total_area",
                "total_livable_area",
            ],
            CastRule::Float,
        )
        .cast_all(
            &[
                "exempt_building",
                "exempt_land",
                "market_value",
                "sale_price",
                "taxable_building",
                "taxable_land",
            ],
            CastRule::MONEY,
        )
        .cast_all(
            &[
                "fireplaces",
                "garage_spaces",
                "homestead_exemption",
                "number_of_bathrooms",
                "number_of_bedrooms",
                "number_of_rooms",
                "off_street_open",
            ],
            CastRule::Int,
        )
        .primary_key("parcel_number")
        .build()
}

fn master_address() -> TableSpec {
    TableSpec::builder("dbo.masteraddress.csv", "master_address")
        .column(1, "master_address_id", 100)
        .column(2, "address_text", 400)
        .cast("master_address_id", CastRule::Uuid)
        .primary_key("master_address_id")
        .build()
}

fn master_entity() -> TableSpec {
    TableSpec::builder("dbo.masterentity.csv", "master_entity")
        .column(1, "master_entity_id", 100)
        .column(2, "name_text", 400)
        .cast("master_entity_id", CastRule::Uuid)
        .primary_key("master_entity_id")
        .build()
}

fn case_investigations() -> TableSpec {
    TableSpec::builder("dbo.philly_case_investigations.csv", "case_investigations")
        .column(1, "address", 200)
        .column(2, "addressobjectid", 20)
        .column(3, "cartodb_id", 20)
        .column(4, "casenumber", 30)
        .column(5, "casepriority", 20)
        .column(6, "caseresponsibility", 100)
        .column(7, "casetype", 50)
        .column(8, "censustract", 20)
        .column(9, "council_district", 5)
        .column(10, "geocode_x", 50)
        .column(11, "geocode_y", 50)
        .column(12, "investigationcompleted", 50)
        .column(13, "investigationprocessid", 20)
        .column(14, "investigationstatus", 20)
        .column(15, "investigationtype", 50)
        .column(16, "objectid", 20)
        .column(17, "opa_account_num", 20)
        .column(18, "opa_owner", 200)
        .column(19, "parcel_id_num", 20)
        .column(20, "posse_jobid", 20)
        .column(21, "systemofrecord", 20)
        .skip(22) // the_geom
        .skip(23) // the_geom_webmercator
        .column(24, "unit_num", 20)
        .column(25, "unit_type", 20)
        .column(26, "zip", 20)
        .cast_all(&["objectid", "cartodb_id"], CastRule::Int)
        .cast_all(&["geocode_x", "geocode_y"], CastRule::Float)
        .cast("investigationcompleted", CastRule::Timestamp)
        .primary_key("objectid")
        .build()
}

fn assessments() -> TableSpec {
    TableSpec::builder("dbo.philly_assessments.csv", "assessments")
        .column(1, "cartodb_id", 20)
        .column(2, "exempt_building", 50)
        .column(3, "exempt_land", 50)
        .column(4, "market_value", 50)
        .column(5, "parcel_number", 20)
        .column(6, "taxable_building", 50)
        .column(7, "taxable_land", 50)
        .skip(8) // the_geom
        .skip(9) // the_geom_webmercator
        .column(10, "year", 10)
        .cast_all(&["cartodb_id", "year"], CastRule::Int)
        .cast_all(
            &[
                "exempt_building",
                "exempt_land",
                "market_value",
                "taxable_building",
                "taxable_land",
            ],
            CastRule::MONEY,
        )
        .primary_key("parcel_number")
        .build()
}

fn master_entity_address() -> TableSpec {
    TableSpec::builder("dbo.masterentityaddress.csv", "master_entity_address")
        .column(1, "master_entity_address_id", 100)
        .column(2, "master_entity_id", 100)
        .column(3, "master_address_id", 100)
        .column(4, "parcel_number", 20)
        .column(5, "notes", 2000)
        .cast_all(
            &[
                "master_entity_address_id",
                "master_entity_id",
                "master_address_id",
            ],
            CastRule::Uuid,
        )
        .primary_key("master_entity_address_id")
        .depends_on("master_entity")
        .depends_on("master_address")
        .build()
}
